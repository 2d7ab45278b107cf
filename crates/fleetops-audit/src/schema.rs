//! Audit event schema and metadata definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata attached to all audit events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Schema version for this event format
    pub schema_version: String,

    /// Event source identifier
    pub source: String,

    /// Environment (production, staging, development)
    pub environment: Option<String>,

    /// Hostname where the event was generated
    pub hostname: Option<String>,

    /// Process ID
    pub pid: Option<u32>,

    /// Additional custom tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Default for AuditMetadata {
    fn default() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            source: "fleetops".to_string(),
            environment: None,
            hostname: None,
            pid: None,
            tags: Vec::new(),
        }
    }
}

impl AuditMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates metadata with source identification.
    #[must_use]
    pub fn with_source(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }

    /// Sets the environment.
    #[must_use]
    pub fn environment(mut self, env: &str) -> Self {
        self.environment = Some(env.to_string());
        self
    }

    /// Sets the hostname.
    #[must_use]
    pub fn hostname(mut self, hostname: &str) -> Self {
        self.hostname = Some(hostname.to_string());
        self
    }

    /// Sets the process ID.
    #[must_use]
    pub const fn pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tag(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }
}

/// Current schema version.
pub const CURRENT_SCHEMA_VERSION: &str = "1.0.0";

/// Event schema definition for documentation and validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSchema {
    /// Schema name
    pub name: String,

    /// Schema version
    pub version: String,

    /// Event type pattern this schema applies to
    pub event_type_pattern: String,

    /// Schema description
    pub description: String,

    /// Required fields
    pub required_fields: Vec<FieldDefinition>,

    /// Optional fields
    pub optional_fields: Vec<FieldDefinition>,

    /// Schema creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Field definition within a schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Field name
    pub name: String,

    /// Field type
    pub field_type: FieldType,

    /// Field description
    pub description: String,

    /// Example value
    pub example: Option<String>,
}

/// Supported field types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// String field
    String,
    /// Integer field
    Integer,
    /// Float field
    Float,
    /// Boolean field
    Boolean,
    /// Timestamp field
    Timestamp,
    /// UUID field
    Uuid,
    /// Array field
    Array,
    /// Object field
    Object,
}

impl EventSchema {
    /// Creates a new event schema.
    #[must_use]
    pub fn new(name: &str, version: &str, event_type_pattern: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            event_type_pattern: event_type_pattern.to_string(),
            description: description.to_string(),
            required_fields: Vec::new(),
            optional_fields: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn required(mut self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.required_fields.push(FieldDefinition {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
            example: None,
        });
        self
    }

    /// Adds an optional field.
    #[must_use]
    pub fn optional(mut self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.optional_fields.push(FieldDefinition {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
            example: None,
        });
        self
    }
}

impl FieldDefinition {
    /// Creates a new field definition.
    #[must_use]
    pub fn new(name: &str, field_type: FieldType, description: &str) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            description: description.to_string(),
            example: None,
        }
    }

    /// Sets an example value.
    #[must_use]
    pub fn with_example(mut self, example: &str) -> Self {
        self.example = Some(example.to_string());
        self
    }
}

/// Returns the schema for deploy lifecycle events.
#[must_use]
pub fn deploy_event_schema() -> EventSchema {
    EventSchema::new(
        "DeployEvent",
        "1.0.0",
        "deploy.*",
        "Events related to lock acquisition and terminal machine outcomes",
    )
    .required("id", FieldType::Uuid, "Unique event identifier")
    .required("timestamp", FieldType::Timestamp, "Event timestamp")
    .required("event_type", FieldType::String, "Type of deploy event")
    .required("project_name", FieldType::String, "Project name")
    .required("config_name", FieldType::String, "Config name")
    .required("release_id", FieldType::String, "Release ID")
    .required("uuid", FieldType::String, "Execution uuid")
    .required("outcome", FieldType::String, "Event outcome")
    .optional("duration_ms", FieldType::Integer, "Stage duration in milliseconds")
    .optional("details", FieldType::String, "Additional details")
    .optional("correlation_id", FieldType::String, "Correlation ID")
}
