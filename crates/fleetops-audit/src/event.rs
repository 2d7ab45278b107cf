//! Audit event definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::{Timestamp, Uuid};

/// Generates a new v7 UUID for audit events.
fn new_event_id() -> Uuid {
    let ts = Timestamp::now(uuid::NoContext);
    Uuid::new_v7(ts)
}

/// Severity level for audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    /// Informational event
    #[default]
    Info,
    /// Warning event
    Warning,
    /// Error event
    Error,
    /// Critical event requiring immediate attention
    Critical,
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventOutcome {
    /// Operation succeeded
    Success,
    /// Operation failed
    Failure,
    /// Operation was denied
    Denied,
    /// Operation is in progress
    InProgress,
}

/// Base trait for all audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type identifier.
    fn event_type(&self) -> &'static str;

    /// Returns the event severity.
    fn severity(&self) -> EventSeverity;

    /// Returns the event timestamp.
    fn timestamp(&self) -> DateTime<Utc>;

    /// Returns the correlation ID for request tracing.
    fn correlation_id(&self) -> Option<&str>;
}

/// Types of deploy lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployEventType {
    /// The project/config lock was acquired.
    LockAcquired,
    /// The project/config lock was released.
    LockReleased,
    /// A machine execution started.
    DeployStarted,
    /// The machine reached `Success`.
    DeploySucceeded,
    /// The machine reached `FailureClean`.
    DeployFailedClean,
    /// The machine reached `FailureDirty`.
    DeployFailedDirty,
}

/// Structured audit event for a deploy-orchestrator state transition.
///
/// One of these is emitted for every lock acquisition/release and every
/// terminal machine outcome, so a deployment's full history can be
/// reconstructed from the audit stream alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployEvent {
    /// Unique event ID.
    pub id: Uuid,

    /// Event timestamp.
    pub timestamp: DateTime<Utc>,

    /// Type of deploy event.
    pub event_type: DeployEventType,

    /// Project name.
    pub project_name: String,

    /// Config name.
    pub config_name: String,

    /// Release ID.
    pub release_id: String,

    /// Execution uuid (the lock holder).
    pub uuid: String,

    /// Event outcome.
    pub outcome: EventOutcome,

    /// Wall-clock duration of the stage this event closes out, if known.
    pub duration_ms: Option<u64>,

    /// Additional details, e.g. the error kind on a failure path.
    pub details: Option<String>,

    /// Correlation ID for tracing.
    pub correlation_id: Option<String>,
}

impl DeployEvent {
    fn new(
        event_type: DeployEventType,
        project_name: &str,
        config_name: &str,
        release_id: &str,
        uuid: &str,
        outcome: EventOutcome,
    ) -> Self {
        Self {
            id: new_event_id(),
            timestamp: Utc::now(),
            event_type,
            project_name: project_name.to_string(),
            config_name: config_name.to_string(),
            release_id: release_id.to_string(),
            uuid: uuid.to_string(),
            outcome,
            duration_ms: None,
            details: None,
            correlation_id: None,
        }
    }

    /// Creates a lock-acquired event.
    #[must_use]
    pub fn lock_acquired(project_name: &str, config_name: &str, release_id: &str, uuid: &str) -> Self {
        Self::new(
            DeployEventType::LockAcquired,
            project_name,
            config_name,
            release_id,
            uuid,
            EventOutcome::Success,
        )
    }

    /// Creates a lock-released event.
    #[must_use]
    pub fn lock_released(project_name: &str, config_name: &str, release_id: &str, uuid: &str) -> Self {
        Self::new(
            DeployEventType::LockReleased,
            project_name,
            config_name,
            release_id,
            uuid,
            EventOutcome::Success,
        )
    }

    /// Creates a deploy-started event.
    #[must_use]
    pub fn deploy_started(project_name: &str, config_name: &str, release_id: &str, uuid: &str) -> Self {
        Self::new(
            DeployEventType::DeployStarted,
            project_name,
            config_name,
            release_id,
            uuid,
            EventOutcome::InProgress,
        )
    }

    /// Creates an event for a terminal machine state (`Success`,
    /// `FailureClean` or `FailureDirty`).
    #[must_use]
    pub fn terminal(
        project_name: &str,
        config_name: &str,
        release_id: &str,
        uuid: &str,
        success: bool,
        dirty: bool,
        duration_ms: u64,
        error_kind: Option<&str>,
    ) -> Self {
        let (event_type, outcome) = match (success, dirty) {
            (true, _) => (DeployEventType::DeploySucceeded, EventOutcome::Success),
            (false, true) => (DeployEventType::DeployFailedDirty, EventOutcome::Failure),
            (false, false) => (DeployEventType::DeployFailedClean, EventOutcome::Failure),
        };
        let mut event = Self::new(event_type, project_name, config_name, release_id, uuid, outcome);
        event.duration_ms = Some(duration_ms);
        event.details = error_kind.map(ToString::to_string);
        event
    }

    /// Sets the correlation ID.
    #[must_use]
    pub fn with_correlation_id(mut self, id: &str) -> Self {
        self.correlation_id = Some(id.to_string());
        self
    }
}

impl AuditEvent for DeployEvent {
    fn event_type(&self) -> &'static str {
        match self.event_type {
            DeployEventType::LockAcquired => "deploy.lock_acquired",
            DeployEventType::LockReleased => "deploy.lock_released",
            DeployEventType::DeployStarted => "deploy.started",
            DeployEventType::DeploySucceeded => "deploy.succeeded",
            DeployEventType::DeployFailedClean => "deploy.failed_clean",
            DeployEventType::DeployFailedDirty => "deploy.failed_dirty",
        }
    }

    fn severity(&self) -> EventSeverity {
        match self.event_type {
            DeployEventType::DeployFailedDirty => EventSeverity::Critical,
            DeployEventType::DeployFailedClean => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_acquired_is_info() {
        let event = DeployEvent::lock_acquired("proj", "conf", "r-1", "uuid-1");
        assert_eq!(event.event_type(), "deploy.lock_acquired");
        assert_eq!(event.severity(), EventSeverity::Info);
    }

    #[test]
    fn terminal_success_vs_dirty_failure() {
        let success = DeployEvent::terminal("proj", "conf", "r-1", "uuid-1", true, false, 1200, None);
        assert_eq!(success.event_type(), "deploy.succeeded");
        assert_eq!(success.severity(), EventSeverity::Info);

        let dirty = DeployEvent::terminal(
            "proj",
            "conf",
            "r-1",
            "uuid-1",
            false,
            true,
            900,
            Some("DetachError"),
        );
        assert_eq!(dirty.event_type(), "deploy.failed_dirty");
        assert_eq!(dirty.severity(), EventSeverity::Critical);
        assert_eq!(dirty.details, Some("DetachError".to_string()));
    }

    #[test]
    fn clean_failure_is_warning() {
        let event = DeployEvent::terminal("proj", "conf", "r-1", "uuid-1", false, false, 50, Some("BadReleaseError"));
        assert_eq!(event.event_type(), "deploy.failed_clean");
        assert_eq!(event.severity(), EventSeverity::Warning);
    }

    #[test]
    fn event_serialization_round_trips() {
        let event = DeployEvent::deploy_started("proj", "conf", "r-1", "uuid-1");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"project_name\":\"proj\""));

        let deserialized: DeployEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.release_id, event.release_id);
    }
}
