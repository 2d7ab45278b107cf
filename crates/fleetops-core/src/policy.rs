//! Scaling policies attached to a service's autoscaling configuration.

use serde::{Deserialize, Serialize};

use crate::validation::{Validate, ValidationError, ValidationErrors};

/// The direction (or explicit adjustment) a scaling policy applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Scale out in response to rising CPU utilization.
    CpuScaleUp,
    /// Scale in in response to falling CPU utilization.
    CpuScaleDown,
    /// An operator-specified adjustment not tied to a named metric.
    Explicit,
}

/// A single CloudWatch-alarm-backed scaling rule. Names must be unique
/// within a service's `autoscaling.policies`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name, unique within its owning service.
    pub name: String,
    /// Kind of adjustment this policy performs.
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    /// Instances added (positive) or removed (negative) when the alarm
    /// fires.
    pub scaling_adjustment: i32,
    /// Metric threshold that triggers the alarm.
    pub threshold: f64,
    /// Seconds in each evaluation period.
    pub period: u32,
    /// Number of periods the threshold must be breached before the alarm
    /// fires.
    pub evaluation_periods: u32,
    /// Seconds to wait after this policy fires before it may fire again.
    pub cooldown: u32,
}

impl Validate for Policy {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if self.name.is_empty() {
            errors.add(ValidationError::required("policy.name"));
        }
        if self.period == 0 {
            errors.add(ValidationError::range(
                "policy.period",
                "must be greater than zero",
            ));
        }
        if self.evaluation_periods == 0 {
            errors.add(ValidationError::range(
                "policy.evaluation_periods",
                "must be greater than zero",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
