//! Fixture builders for `Release`/`Service`/`Instances`.
//!
//! These build the minimal valid domain objects the rest of the workspace's
//! test suites start from, then let the caller override just the fields
//! their test cares about.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use fleetops_core::instances::{InstanceState, Instances};
use fleetops_core::release::Release;
use fleetops_core::service::{AutoscalingConfig, DetachStrategy, Service};
use fleetops_core::strategy::RolloutStrategy;

use crate::error::{Result, TestError};

/// Builds a minimal, valid [`Service`] fixture.
///
/// # Examples
///
/// ```rust
/// use fleetops_test::ServiceFixture;
///
/// let web = ServiceFixture::new("web").min_max(1, 4).build();
/// assert_eq!(web.name, "web");
/// ```
#[derive(Debug, Clone)]
pub struct ServiceFixture {
    service: Service,
}

impl ServiceFixture {
    /// Creates a fixture for a service named `name`, with a single-instance
    /// `m5.large` scaling group, `AllAtOnce` rollout and no load balancers.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            service: Service {
                name: name.into(),
                instance_type: "m5.large".to_string(),
                profile: "default".to_string(),
                security_groups: Vec::new(),
                elbs: Vec::new(),
                target_groups: Vec::new(),
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
                    policies: Vec::new(),
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
        }
    }

    /// Sets the autoscaling group's min/max size.
    #[must_use]
    pub const fn min_max(mut self, min_size: u32, max_size: u32) -> Self {
        self.service.autoscaling.min_size = min_size;
        self.service.autoscaling.max_size = max_size;
        self
    }

    /// Sets the rollout strategy.
    #[must_use]
    pub fn strategy(mut self, strategy: RolloutStrategy) -> Self {
        self.service.autoscaling.strategy = strategy;
        self
    }

    /// Attaches classic load balancer names.
    #[must_use]
    pub fn elbs(mut self, elbs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.service.elbs = elbs.into_iter().map(Into::into).collect();
        self
    }

    /// Attaches target group names.
    #[must_use]
    pub fn target_groups(mut self, target_groups: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.service.target_groups = target_groups.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the fixture.
    #[must_use]
    pub fn build(self) -> Service {
        self.service
    }
}

/// Builds a minimal, valid [`Release`] fixture with a single service named
/// `web`, produced with [`ServiceFixture::new`].
///
/// # Examples
///
/// ```rust
/// use fleetops_test::ReleaseFixture;
///
/// let release = ReleaseFixture::new("proj", "conf").build();
/// assert_eq!(release.project_name, "proj");
/// ```
#[derive(Debug, Clone)]
pub struct ReleaseFixture {
    release: Release,
}

impl ReleaseFixture {
    /// Creates a fixture for `project_name`/`config_name`, with one `web`
    /// service, a single subnet, and a one-hour timeout.
    #[must_use]
    pub fn new(project_name: impl Into<String>, config_name: impl Into<String>) -> Self {
        let mut services = HashMap::new();
        services.insert("web".to_string(), ServiceFixture::new("web").build());

        let document = serde_json::json!({
            "project_name": project_name.into(),
            "config_name": config_name.into(),
            "release_id": "2026-01-01T00-00-00Z",
            "account_id": "000000000000",
            "region": "us-east-1",
            "bucket": "fleetops-releases",
            "timeout_seconds": 3600,
            "ami": "ami-0123456789abcdef0",
            "subnets": ["subnet-0123456789abcdef0"],
            "services": {},
        });
        let mut release = Release::from_json(&document.to_string())
            .expect("fixture release document is always well-formed");
        release.services = services;

        Self { release }
    }

    /// Replaces the release's services with `services`.
    #[must_use]
    pub fn services(mut self, services: HashMap<String, Service>) -> Self {
        self.release.services = services;
        self
    }

    /// Enables the safe-release diff stage.
    #[must_use]
    pub const fn safe_release(mut self, safe_release: bool) -> Self {
        self.release.safe_release = safe_release;
        self
    }

    /// Sets the release timeout.
    #[must_use]
    pub const fn timeout_seconds(mut self, timeout_seconds: i64) -> Self {
        self.release.timeout_seconds = timeout_seconds;
        self
    }

    /// Builds the fixture, applying default expansion as the `Validate`
    /// state would.
    #[must_use]
    pub fn build(mut self) -> Release {
        let uuid = self.release.uuid.clone();
        self.release.apply_defaults(uuid);
        self.release
    }
}

/// Builds an [`Instances`] fixture from a flat list of `(id, state)` pairs,
/// all reported through the scaling-group view.
#[must_use]
pub fn instances_fixture(states: &[(&str, InstanceState)]) -> Instances {
    let mut instances = Instances::new();
    for (id, state) in states {
        instances.add_asg_instance((*id).to_string(), *state);
    }
    instances
}

/// Reads a [`Release`] fixture from a JSON file on disk, for tests that
/// exercise the on-disk release-document shape directly.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn release_from_json_file(path: impl AsRef<Path>) -> Result<Release> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| TestError::FileReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Release::from_json(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_fixture_has_one_service() {
        let release = ReleaseFixture::new("proj", "conf").build();
        assert_eq!(release.project_name, "proj");
        assert_eq!(release.services.len(), 1);
        assert!(release.services.contains_key("web"));
    }

    #[test]
    fn service_fixture_overrides_apply() {
        let service = ServiceFixture::new("api")
            .min_max(2, 8)
            .strategy(RolloutStrategy::TenPercentStep)
            .elbs(["elb-a"])
            .build();
        assert_eq!(service.autoscaling.min_size, 2);
        assert_eq!(service.autoscaling.max_size, 8);
        assert_eq!(service.elbs, vec!["elb-a".to_string()]);
    }

    #[test]
    fn instances_fixture_builds_asg_view() {
        let instances = instances_fixture(&[("i-1", InstanceState::Healthy), ("i-2", InstanceState::Terminating)]);
        assert_eq!(instances.healthy_ids().count(), 1);
        assert_eq!(instances.terminating_ids().count(), 1);
    }
}
