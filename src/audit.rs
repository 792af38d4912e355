/// Audit trail for operations that change the appliance
///
/// Successful and failed applies, enables and disables are appended as JSON
/// lines, as are applies refused locally because the working copy did not
/// validate.
use crate::core::error::Error;
use crate::core::ruleset::{Policy, RulesetUpdate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ApplyRules,
    ApplyRefused,
    Enable,
    Disable,
    UpdateSettings,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: EventType,
    pub success: bool,
    /// Additional structured data about the event
    pub details: serde_json::Value,
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }

    pub fn apply(update: &RulesetUpdate, outcome: Result<(), &Error>) -> Self {
        Self::new(
            EventType::ApplyRules,
            outcome.is_ok(),
            serde_json::json!({
                "rule_count": update.rules.len(),
                "active_count": update.rules.iter().filter(|r| r.active).count(),
                "policy": update.policy,
            }),
            outcome.err().map(ToString::to_string),
        )
    }

    pub fn apply_refused(error: &Error) -> Self {
        let fields: Vec<String> = error.fields().iter().map(ToString::to_string).collect();
        Self::new(
            EventType::ApplyRefused,
            false,
            serde_json::json!({ "fields": fields }),
            Some(error.to_string()),
        )
    }

    pub fn toggle(enable: bool, policy: Option<Policy>, outcome: Result<(), &Error>) -> Self {
        Self::new(
            if enable {
                EventType::Enable
            } else {
                EventType::Disable
            },
            outcome.is_ok(),
            serde_json::json!({ "policy": policy }),
            outcome.err().map(ToString::to_string),
        )
    }
}

/// Audit log writer
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Audit log in the state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let mut log_path = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;
        log_path.push("audit.log");

        Ok(Self { log_path })
    }

    /// Audit log at an explicit path
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: path.into(),
        }
    }

    /// Appends an event as one JSON line
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be opened or written
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Like [`AuditLog::log`], but only warns on failure.
    ///
    /// A broken audit file must never fail the firewall operation it records.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.log(&event).await {
            tracing::warn!("Failed to write audit log: {}", e);
        }
    }

    /// Reads the most recent events, newest first. Unparseable lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns `Err` if file cannot be read
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        Ok(content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}
