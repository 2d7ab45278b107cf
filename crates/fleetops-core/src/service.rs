//! The per-service rollout description inside a release.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::policy::Policy;
use crate::resources::ServiceResourceNames;
use crate::strategy::{AutoscalingParams, RolloutStrategy};
use crate::validation::{Validate, ValidationError, ValidationErrors};

/// How a scaling group is detached from its load balancers during teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachStrategy {
    /// Issue detach calls and poll until `AttachedLBs` is empty.
    #[default]
    Detach,
    /// Skip the detach stage entirely.
    SkipDetach,
    /// Issue detach calls but skip the readback poll.
    SkipDetachCheck,
}

/// Autoscaling configuration for a service's scaling group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    /// Minimum group size.
    pub min_size: u32,
    /// Maximum group size.
    pub max_size: u32,
    /// Terminating instances tolerated before the deploy halts.
    pub max_terminations: u32,
    /// Fraction in `[0, 1]` spreading target capacity/healthy around desired
    /// capacity.
    #[serde(default = "default_spread")]
    pub spread: f64,
    /// Seconds a scaling policy must wait before firing again.
    #[serde(default = "default_cooldown")]
    pub default_cooldown: u32,
    /// Seconds a freshly launched instance is excluded from health checks.
    #[serde(default = "default_grace_period")]
    pub health_check_grace_period: u32,
    /// Scaling policies attached to the group.
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Rollout strategy selected for this service.
    #[serde(default)]
    pub strategy: RolloutStrategy,
    /// Desired capacity left over from the previously deployed release, if
    /// any. Not user-supplied; filled in by resource validation.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub previous_desired_capacity: Option<u32>,
}

const fn default_spread() -> f64 {
    0.0
}

const fn default_cooldown() -> u32 {
    300
}

const fn default_grace_period() -> u32 {
    300
}

impl AutoscalingConfig {
    /// Projects this configuration into the strategy math's input type.
    #[must_use]
    pub fn params(&self) -> AutoscalingParams {
        AutoscalingParams {
            min_size: self.min_size,
            max_size: self.max_size,
            max_terminations: self.max_terminations,
            spread: self.spread,
            previous_desired_capacity: self.previous_desired_capacity,
        }
    }
}

impl Validate for AutoscalingConfig {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.min_size > self.max_size {
            errors.add(ValidationError::constraint(
                "autoscaling.min_size",
                "must not exceed max_size",
            ));
        }
        if !(0.0..=1.0).contains(&self.spread) {
            errors.add(ValidationError::range(
                "autoscaling.spread",
                "must be between 0 and 1",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for policy in &self.policies {
            if !seen.insert(policy.name.clone()) {
                errors.add(ValidationError::constraint(
                    "autoscaling.policies",
                    format!("duplicate policy name '{}'", policy.name),
                ));
            }
            if let Err(policy_errors) = policy.validate() {
                errors.merge(policy_errors);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Health summary for one service on one tick, per §3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Instances the strategy wants launched this tick.
    pub target_launched: u32,
    /// Instances that must be healthy for the service to be healthy.
    pub target_healthy: u32,
    /// Instances currently healthy.
    pub healthy: u32,
    /// Instances still launching (neither healthy nor unhealthy yet).
    pub launching: u32,
    /// Instances being terminated.
    pub terminating: u32,
}

/// EBS volume attached to each launched instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EbsVolume {
    /// Volume size in GiB.
    pub size: u32,
    /// Volume type, e.g. `gp3`.
    #[serde(rename = "type")]
    pub volume_type: String,
    /// Device name the volume is attached as, e.g. `/dev/xvda`.
    pub device_name: String,
}

/// A single service's rollout description, and the running state the
/// machine accumulates against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service name; unique within its release.
    pub name: String,
    /// Instance type launched for this service.
    pub instance_type: String,
    /// IAM instance profile name.
    pub profile: String,
    /// Security group names to attach.
    #[serde(default)]
    pub security_groups: Vec<String>,
    /// Classic load balancer names to attach.
    #[serde(default)]
    pub elbs: Vec<String>,
    /// Target group names to attach.
    #[serde(default)]
    pub target_groups: Vec<String>,
    /// User-supplied tags propagated to the scaling group and its
    /// instances.
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// EBS volume configuration, if any beyond the AMI's default.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ebs_volume: Option<EbsVolume>,
    /// Whether launched instances receive a public IP.
    #[serde(default)]
    pub associate_public_ip: bool,
    /// Autoscaling configuration.
    pub autoscaling: AutoscalingConfig,
    /// How this service's scaling group is detached during teardown.
    #[serde(default)]
    pub detach_strategy: DetachStrategy,

    /// Name of the scaling group created for the current release, once
    /// deploy has run. Not user-supplied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub created_asg: Option<String>,
    /// Resolved resource identifiers from validation. Not user-supplied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub resource_names: Option<ServiceResourceNames>,
    /// Health report from the most recent tick. Not user-supplied.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub health_report: Option<HealthReport>,
    /// Whether this service currently meets its strategy's health target.
    #[serde(default)]
    pub healthy: bool,

    /// Back-reference to the owning release, rebuilt by
    /// [`Service::apply_defaults`] and never serialized (§9 "Back-references").
    #[serde(skip)]
    pub owner: Option<ServiceOwner>,
}

/// The subset of release fields a service needs back-referenced, rebuilt
/// after deserialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceOwner {
    /// Owning release's project name.
    pub project_name: String,
    /// Owning release's config name.
    pub config_name: String,
    /// Owning release's id.
    pub release_id: String,
    /// Owning release's creation time.
    pub created_at: DateTime<Utc>,
}

impl Service {
    /// Formats this service's scaling-group id: `<project>-<config>-<yyyy-mm-ddThh-mm-ssZ>-<service>`,
    /// truncated to 80 characters by shortening the project/config prefixes
    /// from the right.
    #[must_use]
    pub fn service_id(&self) -> String {
        let Some(owner) = &self.owner else {
            return self.name.clone();
        };
        let timestamp = owner.created_at.format("%Y-%m-%dT%H-%M-%SZ");
        let suffix = format!("-{timestamp}-{}", self.name);
        let budget = 80usize.saturating_sub(suffix.len());
        let project_budget = budget / 2;
        let config_budget = budget - project_budget;
        let project = truncate_from_right(&owner.project_name, project_budget);
        let config = truncate_from_right(&owner.config_name, config_budget);
        format!("{project}-{config}{suffix}")
    }

    /// Rebuilds the back-reference to the owning release and fills in
    /// defaults: autoscaling spread/cooldown/grace-period, detach strategy,
    /// and user-data token substitution is handled at the release level
    /// (§9 "User-data templating").
    pub fn apply_defaults(&mut self, owner: ServiceOwner) {
        self.owner = Some(owner);
    }

    /// Sets `healthy` from a [`HealthReport`], per §4.9: healthy iff the
    /// number of healthy instances meets the strategy's target.
    pub fn set_healthy(&mut self, report: HealthReport) {
        self.healthy = report.healthy >= report.target_healthy;
        self.health_report = Some(report);
    }

    /// Renders the release's user-data template for this specific service,
    /// substituting its own name alongside the release-level tokens (§9
    /// "User-data templating").
    #[must_use]
    pub fn render_user_data(&self, template: &str) -> String {
        let owner = self.owner.as_ref();
        render_user_data(
            template,
            owner.map_or("", |o| o.release_id.as_str()),
            owner.map_or("", |o| o.project_name.as_str()),
            owner.map_or("", |o| o.config_name.as_str()),
            &self.name,
        )
    }
}

impl Validate for Service {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.is_empty() {
            errors.add(ValidationError::required("service.name"));
        }
        if self.instance_type.is_empty() {
            errors.add(ValidationError::required("service.instance_type"));
        }
        if self.profile.is_empty() {
            errors.add(ValidationError::required("service.profile"));
        }
        if let Err(autoscaling_errors) = self.autoscaling.validate() {
            errors.merge(autoscaling_errors);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn truncate_from_right(s: &str, budget: usize) -> String {
    if s.len() <= budget {
        s.to_string()
    } else {
        s.chars().take(budget).collect()
    }
}

/// Substitutes `{{RELEASE_ID}}`, `{{PROJECT_NAME}}`, `{{CONFIG_NAME}}` and
/// `{{SERVICE_NAME}}` tokens inside `user_data`; everything else passes
/// through verbatim (§9 "User-data templating").
#[must_use]
pub fn render_user_data(
    template: &str,
    release_id: &str,
    project_name: &str,
    config_name: &str,
    service_name: &str,
) -> String {
    template
        .replace("{{RELEASE_ID}}", release_id)
        .replace("{{PROJECT_NAME}}", project_name)
        .replace("{{CONFIG_NAME}}", config_name)
        .replace("{{SERVICE_NAME}}", service_name)
}
