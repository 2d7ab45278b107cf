//! The release document: one attempt to roll out a set of services for a
//! project/config.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::lifecycle::LifeCycleHook;
use crate::service::{Service, ServiceOwner};
use crate::validation::{Validate, ValidationError, ValidationErrors};

/// Upper bound on a release's lifetime (§3 invariants).
pub const MAX_TIMEOUT_SECONDS: i64 = 48 * 60 * 60;

/// Upper bound on the number of machine state transitions a release may
/// cause, expressed as `(5 / wait_for_healthy) * timeout_seconds` (§3).
pub const MAX_TRANSITION_BUDGET: f64 = 10_000.0;

/// A structured error written by a catch branch of the state machine, kept
/// on the release document so the full history survives independent of the
/// machine's transient in-memory state (§10.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseError {
    /// The error kind's display string.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

impl From<&Error> for ReleaseError {
    fn from(error: &Error) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// One attempt to roll out a specific set of services for a project/config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Release {
    /// Ownership pair, together forming the lock/mutex domain.
    pub project_name: String,
    /// Ownership pair, together forming the lock/mutex domain.
    pub config_name: String,
    /// Timestamp-based identifier, unique per release.
    pub release_id: String,
    /// Identifier of a single machine execution, written into the lock
    /// object to disambiguate concurrent attempts.
    #[serde(default)]
    pub uuid: String,
    /// Cloud account the release deploys into.
    pub account_id: String,
    /// Cloud region the release deploys into.
    pub region: String,
    /// Object-store bucket this release's documents live in.
    pub bucket: String,

    /// Wall-clock creation time.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// Seconds after `created_at` at which the release is halted.
    pub timeout_seconds: i64,

    /// AMI id launched for every service unless overridden.
    #[serde(rename = "ami")]
    pub image: String,
    /// Subnet names instances are launched into.
    pub subnets: Vec<String>,
    /// Lifecycle hooks, keyed by name.
    #[serde(default)]
    pub lifecycle_hooks: HashMap<String, LifeCycleHook>,
    /// Services to roll out, keyed by name.
    pub services: HashMap<String, Service>,

    /// Opaque user-data payload, base64 or plain text depending on the
    /// provider; fetched separately from the object store and verified
    /// against `user_data_sha256`.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user_data: Option<String>,
    /// SHA-256 of the user-data payload, hex-encoded.
    #[serde(default)]
    pub user_data_sha256: String,

    /// SHA-256 of the release document exactly as first received, computed
    /// before any default expansion.
    #[serde(default)]
    pub release_sha256: String,

    /// Enables the safe-release diff stage (§4.6).
    #[serde(default)]
    pub safe_release: bool,

    /// Polling interval used by `WaitForHealthy`, derived from `timeout`.
    #[serde(default)]
    pub wait_for_healthy: u32,
    /// Polling interval used while waiting for detach to converge.
    #[serde(default)]
    pub wait_for_detach: u32,

    /// Whether every service currently meets its strategy's health target.
    #[serde(default)]
    pub healthy: bool,
    /// Set by the machine's terminal `Success` state.
    #[serde(default)]
    pub success: bool,
    /// Structured error written by a catch branch, if the machine failed.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<ReleaseError>,
}

impl Release {
    /// Parses a release document from JSON, rejecting unknown top-level
    /// keys (§6: "misspellings are the dominant failure mode this
    /// guards against").
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnmarshalError`] if the document is not valid JSON
    /// or contains unrecognised fields.
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(Error::UnmarshalError)
    }

    /// Computes and stamps `release_sha256` over the document exactly as
    /// received, before any default expansion. Must be called first, per
    /// §4.2.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnmarshalError`] if this release cannot be
    /// re-serialized (unexpected, since it was just deserialized).
    pub fn stamp_release_sha(&mut self) -> Result<()> {
        let bytes = serde_json::to_vec(self).map_err(Error::UnmarshalError)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        self.release_sha256 = hex::encode(hasher.finalize());
        Ok(())
    }

    /// Fills in every derived default: `wait_for_healthy` tier from
    /// `timeout_seconds`, `uuid` if absent, and each service's
    /// back-reference to this release. User-data is rendered per service
    /// via [`crate::service::Service::render_user_data`], since each
    /// service substitutes its own `{{SERVICE_NAME}}`.
    pub fn apply_defaults(&mut self, uuid: impl Into<String>) {
        if self.uuid.is_empty() {
            self.uuid = uuid.into();
        }
        self.wait_for_healthy = wait_for_healthy_tier(self.timeout_seconds);

        let owner = ServiceOwner {
            project_name: self.project_name.clone(),
            config_name: self.config_name.clone(),
            release_id: self.release_id.clone(),
            created_at: self.created_at,
        };
        for service in self.services.values_mut() {
            service.apply_defaults(owner.clone());
        }
    }

    /// Verifies `user_data` (once fetched) hashes to `user_data_sha256`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadReleaseError`] if the fetched user-data does not
    /// match the declared hash.
    pub fn validate_user_data_sha(&self) -> Result<()> {
        let Some(user_data) = &self.user_data else {
            return Ok(());
        };
        let mut hasher = Sha256::new();
        hasher.update(user_data.as_bytes());
        let actual = hex::encode(hasher.finalize());
        if actual == self.user_data_sha256 {
            Ok(())
        } else {
            Err(Error::bad_release(format!(
                "user_data_sha256 mismatch: expected {}, computed {actual}",
                self.user_data_sha256
            )))
        }
    }

    /// Whether this release has exceeded its wall-clock timeout.
    #[must_use]
    pub fn timed_out(&self, now: DateTime<Utc>) -> bool {
        let deadline = self.created_at + chrono::Duration::seconds(self.timeout_seconds);
        now > deadline
    }
}

/// `WaitForHealthy`'s polling interval tier, per §4.1: 15s under 30 minutes,
/// 60s under 2 hours, 120s otherwise.
#[must_use]
pub fn wait_for_healthy_tier(timeout_seconds: i64) -> u32 {
    if timeout_seconds < 30 * 60 {
        15
    } else if timeout_seconds < 2 * 60 * 60 {
        60
    } else {
        120
    }
}

impl Validate for Release {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.project_name.is_empty() {
            errors.add(ValidationError::required("project_name"));
        }
        if self.config_name.is_empty() {
            errors.add(ValidationError::required("config_name"));
        }
        if self.release_id.is_empty() {
            errors.add(ValidationError::required("release_id"));
        }
        if self.subnets.is_empty() {
            errors.add(ValidationError::empty("subnets"));
        }
        if self.services.is_empty() {
            errors.add(ValidationError::empty("services"));
        }
        if self.timeout_seconds <= 0 {
            errors.add(ValidationError::range(
                "timeout_seconds",
                "must be positive",
            ));
        }
        if self.timeout_seconds > MAX_TIMEOUT_SECONDS {
            errors.add(ValidationError::range(
                "timeout_seconds",
                "must not exceed 48 hours",
            ));
        }
        let wait_for_healthy = wait_for_healthy_tier(self.timeout_seconds.max(0));
        if wait_for_healthy > 0 {
            let budget = (5.0 / f64::from(wait_for_healthy)) * self.timeout_seconds.max(0) as f64;
            if budget > MAX_TRANSITION_BUDGET {
                errors.add(ValidationError::constraint(
                    "timeout_seconds",
                    "implies too many WaitForHealthy transitions for its polling tier",
                ));
            }
        }

        for (name, service) in &self.services {
            if name.is_empty() {
                errors.add(ValidationError::required("services key"));
            }
            if name != &service.name {
                errors.add(ValidationError::constraint(
                    "services",
                    format!("key '{name}' does not match service.name '{}'", service.name),
                ));
            }
            if let Err(service_errors) = service.validate() {
                errors.merge(service_errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{AutoscalingConfig, DetachStrategy};
    use crate::strategy::RolloutStrategy;

    fn sample_release() -> Release {
        let mut services = HashMap::new();
        services.insert(
            "web".to_string(),
            Service {
                name: "web".to_string(),
                instance_type: "m5.large".to_string(),
                profile: "web-profile".to_string(),
                security_groups: vec!["sg-web".to_string()],
                elbs: vec![],
                target_groups: vec![],
                tags: HashMap::new(),
                ebs_volume: None,
                associate_public_ip: false,
                autoscaling: AutoscalingConfig {
                    min_size: 1,
                    max_size: 1,
                    max_terminations: 1,
                    spread: 0.0,
                    default_cooldown: 300,
                    health_check_grace_period: 300,
                    policies: vec![],
                    strategy: RolloutStrategy::AllAtOnce,
                    previous_desired_capacity: None,
                },
                detach_strategy: DetachStrategy::Detach,
                created_asg: None,
                resource_names: None,
                health_report: None,
                healthy: false,
                owner: None,
            },
        );
        Release {
            project_name: "proj".to_string(),
            config_name: "conf".to_string(),
            release_id: "2026-07-26t00-00-00z".to_string(),
            uuid: String::new(),
            account_id: "1".to_string(),
            region: "us-east-1".to_string(),
            bucket: "bucket".to_string(),
            created_at: Utc::now(),
            timeout_seconds: 1800,
            image: "ami-1".to_string(),
            subnets: vec!["subnet-1".to_string()],
            lifecycle_hooks: HashMap::new(),
            services,
            user_data: None,
            user_data_sha256: String::new(),
            release_sha256: String::new(),
            safe_release: false,
            wait_for_healthy: 0,
            wait_for_detach: 0,
            healthy: false,
            success: false,
            error: None,
        }
    }

    #[test]
    fn unknown_top_level_key_rejected() {
        let document = r#"{"release_ids": "typo"}"#;
        let result = Release::from_json(document);
        assert!(result.is_err());
    }

    #[test]
    fn valid_release_passes() {
        assert!(sample_release().validate().is_ok());
    }

    #[test]
    fn mismatched_service_name_key_rejected() {
        let mut release = sample_release();
        let mut service = release.services.remove("web").unwrap();
        service.name = "other".to_string();
        release.services.insert("web".to_string(), service);
        assert!(release.validate().is_err());
    }

    #[test]
    fn timeout_over_48h_rejected() {
        let mut release = sample_release();
        release.timeout_seconds = MAX_TIMEOUT_SECONDS + 1;
        assert!(release.validate().is_err());
    }

    #[test]
    fn wait_for_healthy_tiers() {
        assert_eq!(wait_for_healthy_tier(60), 15);
        assert_eq!(wait_for_healthy_tier(3600), 60);
        assert_eq!(wait_for_healthy_tier(3 * 60 * 60), 120);
    }

    #[test]
    fn apply_defaults_sets_uuid_and_wait_tier() {
        let mut release = sample_release();
        release.apply_defaults("uuid-1");
        assert_eq!(release.uuid, "uuid-1");
        assert_eq!(release.wait_for_healthy, 15);
        assert!(release.services["web"].owner.is_some());
    }

    #[test]
    fn stamp_release_sha_is_deterministic() {
        let mut a = sample_release();
        let mut b = sample_release();
        a.stamp_release_sha().unwrap();
        b.stamp_release_sha().unwrap();
        assert_eq!(a.release_sha256, b.release_sha256);
        assert_eq!(a.release_sha256.len(), 64);
    }

    #[test]
    fn user_data_sha_mismatch_rejected() {
        let mut release = sample_release();
        release.user_data = Some("hello".to_string());
        release.user_data_sha256 = "deadbeef".to_string();
        assert!(release.validate_user_data_sha().is_err());
    }

    #[test]
    fn user_data_sha_match_accepted() {
        let mut release = sample_release();
        release.user_data = Some("hello".to_string());
        let mut hasher = Sha256::new();
        hasher.update(b"hello");
        release.user_data_sha256 = hex::encode(hasher.finalize());
        assert!(release.validate_user_data_sha().is_ok());
    }

    #[test]
    fn timed_out_detects_expired_release() {
        let mut release = sample_release();
        release.created_at = Utc::now() - chrono::Duration::seconds(100);
        release.timeout_seconds = 10;
        assert!(release.timed_out(Utc::now()));
    }
}
