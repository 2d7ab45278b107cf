//! Audit logging for the fleet deploy orchestrator.
//!
//! Every lock acquisition/release and every terminal machine outcome
//! (`Success`, `FailureClean`, `FailureDirty`) is logged as a structured
//! [`DeployEvent`] through a pluggable backend, so a deployment's full
//! history can be reconstructed from the audit stream independent of the
//! transient in-memory machine state.
//!
//! # Features
//!
//! - Structured audit events with consistent schema
//! - Multiple output backends (tracing, in-memory, custom)
//! - Correlation IDs for request tracing
//!
//! # Example
//!
//! ```rust
//! use fleetops_audit::{AuditLogger, DeployEvent, TracingBackend};
//! use std::sync::Arc;
//!
//! let logger = AuditLogger::builder()
//!     .with_backend(Arc::new(TracingBackend::new()))
//!     .build();
//!
//! let event = DeployEvent::lock_acquired("proj", "conf", "r-1", "uuid-1");
//! logger.log(&event).unwrap();
//! ```

mod event;
mod logger;
mod schema;

pub use event::{AuditEvent, DeployEvent, DeployEventType, EventOutcome, EventSeverity};
pub use logger::{AuditLogger, InMemoryBackend, LoggerBackend, LoggerError, TracingBackend};
pub use schema::{deploy_event_schema, AuditMetadata, EventSchema, FieldDefinition, FieldType, CURRENT_SCHEMA_VERSION};
