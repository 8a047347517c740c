/// Audit logging for state-changing operations and inspections
///
/// Every mutating use case and every packet inspection is appended to a
/// JSON-lines file, one event per line, whether it succeeded or not.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const AUDIT_FILE_NAME: &str = "audit.log";

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CreateFirewall,
    CreateFilteringPolicy,
    CreateFirewallRule,
    DeleteFirewall,
    DeleteFilteringPolicy,
    DeleteFirewallRule,
    InspectPacket,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    /// Authenticated caller, when known
    #[serde(default)]
    pub username: Option<String>,

    pub success: bool,

    /// The command as submitted, plus outcome fields where relevant
    pub details: serde_json::Value,

    /// Error message if the operation failed
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
            username: None,
            success,
            details,
            error,
        }
    }

    pub fn by(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Audit log writer
#[derive(Debug, Clone)]
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the audit log in the default state directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if state directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let state_dir = crate::utils::get_state_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "State directory not found")
        })?;

        Ok(Self::in_dir(&state_dir))
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            log_path: dir.join(AUDIT_FILE_NAME),
        }
    }

    /// Appends an event as one JSON line
    pub async fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let json = serde_json::to_string(event)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        Ok(())
    }

    /// Reads up to `count` events, newest first; unreadable lines are skipped
    pub async fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = tokio::fs::read_to_string(&self.log_path).await?;

        let events: Vec<AuditEvent> = content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect();

        Ok(events)
    }
}

/// Records the outcome of an operation, warning instead of failing when the
/// log cannot be written.
pub async fn record<T>(
    audit: &AuditLog,
    event_type: EventType,
    username: Option<&str>,
    details: serde_json::Value,
    outcome: &crate::Result<T>,
) {
    let mut event = AuditEvent::new(
        event_type,
        outcome.is_ok(),
        details,
        outcome.as_ref().err().map(ToString::to_string),
    );
    if let Some(username) = username {
        event = event.by(username);
    }

    if let Err(e) = audit.log(&event).await {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}
