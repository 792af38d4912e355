//! Core staging engine
//!
//! Leaves first:
//!
//! - [`ruleset`]: Rule and policy types, address specifiers, wire shape
//! - [`evaluate`]: First-match evaluation of an ordered ruleset
//! - [`error`]: Error types for staging and sync operations
//! - [`staging`]: The editable working copy
//! - [`diff`]: Working copy vs. snapshot comparison
//! - [`workspace`]: Snapshot + working copy + derived diff and issues
//! - [`gate`]: Confirmation policy for enable/disable/apply
//! - [`sync`]: Fetch/push/toggle against the remote authority

pub mod diff;
pub mod error;
pub mod evaluate;
pub mod gate;
pub mod ruleset;
pub mod staging;
pub mod sync;
pub mod workspace;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
