//! fwstage - Firewall rule staging console
//!
//! Keeps a locally staged copy of a remote appliance's ordered firewall
//! ruleset, tracks how it differs from the last confirmed state, validates it,
//! and gates the transitions that could lock the operator out.
//!
//! # Architecture
//!
//! - [`core`] - Ruleset model, staging store, diff, safety gate and sync controller
//! - [`remote`] - The remote authority abstraction and its HTTP binding
//! - [`validators`] - Field and record validation
//! - [`audit`] - Audit trail of operations that change the appliance
//! - [`config`] - Console configuration persistence
//! - [`utils`] - Utility functions (XDG directories, etc.)
//!
//! # Safety Features
//!
//! - Nothing reaches the appliance until an explicit apply
//! - Invalid working copies are refused locally, before any network call
//! - Enabling with a restrictive policy or unapplied changes needs confirmation
//! - Tightening the policy of a running firewall needs confirmation
//! - Stale fetch responses never overwrite newer state

// Allow pedantic clippy warnings that are not worth fixing for this codebase
#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::needless_lifetimes)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]

pub mod audit;
pub mod config;
pub mod core;
pub mod remote;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use crate::core::error::{Error, Result};
pub use crate::core::gate::Request;
pub use crate::core::ruleset::{Action, Mode, Policy, Protocol, Rule, RulesetSnapshot};
pub use crate::core::sync::{Outcome, SyncController};
pub use crate::remote::{HttpAuthority, RemoteAuthority};
