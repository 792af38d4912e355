use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Rule field identifiers used to point validation errors at the offending input
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
pub enum Field {
    #[strum(serialize = "name")]
    Name,
    #[strum(serialize = "proto")]
    Protocol,
    #[strum(serialize = "mode")]
    Mode,
    #[strum(serialize = "action")]
    Action,
    #[strum(serialize = "src")]
    Source,
    #[strum(serialize = "dst")]
    Destination,
    #[strum(serialize = "port_src")]
    SourcePorts,
    #[strum(serialize = "port_dst")]
    DestinationPorts,
    #[strum(serialize = "active")]
    Active,
    #[strum(serialize = "policy")]
    Policy,
}

/// A single failed field of a rule in the working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIssue {
    /// Position of the rule in the working copy
    pub index: usize,
    pub rule_id: Uuid,
    pub field: Field,
    pub message: String,
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule #{} {}: {}", self.index + 1, self.field, self.message)
    }
}

/// Core error types for fwstage
#[derive(Debug, Error)]
pub enum Error {
    /// Input validation failed for one field
    #[error("Validation error in {field}: {message}")]
    Validation { field: Field, message: String },

    /// The working copy contains rules that fail validation
    #[error("{} invalid field(s) in working copy; first: {}", issues.len(), first_issue(issues))]
    InvalidRuleset { issues: Vec<RuleIssue> },

    /// Transport-level failure talking to the remote authority
    #[error("Request failed: {0}")]
    Request(String),

    /// The remote authority answered but declined the operation
    #[error("Remote authority rejected the request: {status}")]
    RemoteRejection { status: String },

    #[error("No rule with id {0} in working copy")]
    UnknownRule(Uuid),

    #[error("Index {index} out of range for {len} rules")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Ruleset limit reached ({0} rules)")]
    TooManyRules(usize),

    /// Operation needs a fetched snapshot first
    #[error("No ruleset snapshot has been fetched yet")]
    NoSnapshot,

    #[error("No matching confirmation is pending")]
    NoPendingConfirmation,

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn first_issue(issues: &[RuleIssue]) -> String {
    issues
        .first()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

impl Error {
    pub fn validation(field: Field, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns `true` for failures of the remote round trip (transport or rejection)
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Request(_) | Self::RemoteRejection { .. })
    }

    /// Fields named by a validation error, in order of appearance
    pub fn fields(&self) -> Vec<Field> {
        match self {
            Self::Validation { field, .. } => vec![*field],
            Self::InvalidRuleset { issues } => issues.iter().map(|i| i.field).collect(),
            _ => Vec::new(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
