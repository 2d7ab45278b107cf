//! Rollout strategies: per-tick capacity arithmetic for a service's scaling
//! group.
//!
//! Every strategy shares the same target-capacity / target-healthy
//! computation derived from `spread`; they differ only in how quickly they
//! ramp a scaling group's `(min_size, desired_capacity)` from its initial
//! values up to that target.

use crate::instances::Instances;
use serde::{Deserialize, Serialize};

/// Inputs to the shared target-capacity computation, taken from a service's
/// autoscaling configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AutoscalingParams {
    /// Minimum allowed group size.
    pub min_size: u32,
    /// Maximum allowed group size.
    pub max_size: u32,
    /// Number of terminating instances tolerated before the deploy halts.
    pub max_terminations: u32,
    /// Fraction in `[0, 1]` controlling how far target capacity/healthy
    /// spread above/below the settled desired capacity.
    pub spread: f64,
    /// Desired capacity of the previous deploy, if one exists.
    pub previous_desired_capacity: Option<u32>,
}

impl AutoscalingParams {
    /// The "settled" capacity the success path resets to: `prevDC` clamped
    /// into `[min, max]`, or `min` if there is no previous deploy.
    #[must_use]
    pub fn desired_capacity(&self) -> u32 {
        self.previous_desired_capacity
            .unwrap_or(self.min_size)
            .clamp(self.min_size, self.max_size)
    }

    /// Instances the scaling group should try to launch this tick.
    #[must_use]
    pub fn target_capacity(&self) -> u32 {
        let scaled = scale(self.desired_capacity(), 1.0 + self.spread);
        scaled.min(self.max_size)
    }

    /// Instances that must be healthy for the service to be considered
    /// healthy this tick.
    #[must_use]
    pub fn target_healthy(&self) -> u32 {
        let scaled = scale(self.desired_capacity(), 1.0 - self.spread);
        scaled.max(self.min_size)
    }
}

fn scale(value: u32, factor: f64) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        ((f64::from(value) * factor).floor().max(0.0)) as u32
    }
}

fn ceil_div(numerator: u32, denominator: u32) -> u32 {
    numerator.div_ceil(denominator.max(1))
}

/// The five named rollout strategies, tagged by variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RolloutStrategy {
    /// Launch the full target capacity immediately.
    #[serde(rename = "AllAtOnce")]
    AllAtOnce,
    /// Launch a single canary instance; only ramp to full capacity once it
    /// is healthy.
    #[serde(rename = "OneThenAllWithCanary")]
    OneThenAllWithCanary,
    /// Ramp in steps of roughly 25% of target capacity per tick.
    #[serde(rename = "25PercentStepRolloutNoCanary")]
    TwentyFivePercentStep,
    /// Ramp in steps of roughly 10% of target capacity per tick.
    #[serde(rename = "10PercentStepRolloutNoCanary")]
    TenPercentStep,
    /// Ramp by a fixed number of instances per tick.
    #[serde(rename = "NAtATimeNoCanary")]
    NAtATime {
        /// Number of instances added per tick.
        n: u32,
    },
}

impl Default for RolloutStrategy {
    fn default() -> Self {
        Self::AllAtOnce
    }
}

impl RolloutStrategy {
    /// `(min_size, desired_capacity)` used when the scaling group is first
    /// created.
    #[must_use]
    pub fn initial_min_desired(&self, params: &AutoscalingParams) -> (u32, u32) {
        let target_capacity = params.target_capacity();
        match self {
            Self::AllAtOnce => (params.min_size, target_capacity),
            Self::OneThenAllWithCanary => (1, 1),
            Self::TwentyFivePercentStep => (
                ceil_div(params.min_size, 4),
                ceil_div(target_capacity, 4),
            ),
            Self::TenPercentStep => (
                ceil_div(params.min_size, 10),
                ceil_div(target_capacity, 10),
            ),
            Self::NAtATime { n } => (1, (*n).min(target_capacity).max(1)),
        }
    }

    /// `min_size` used at scaling-group creation time.
    #[must_use]
    pub fn initial_min_size(&self, params: &AutoscalingParams) -> u32 {
        self.initial_min_desired(params).0
    }

    /// `desired_capacity` used at scaling-group creation time.
    #[must_use]
    pub fn initial_desired_capacity(&self, params: &AutoscalingParams) -> u32 {
        self.initial_min_desired(params).1
    }

    /// `(min_size, desired_capacity)` to set for the current tick, given the
    /// instances currently observed in the scaling group.
    #[must_use]
    pub fn calculate_min_desired(
        &self,
        params: &AutoscalingParams,
        instances: &Instances,
    ) -> (u32, u32) {
        let target_capacity = params.target_capacity();
        let k = u32::try_from(instances.len()).unwrap_or(u32::MAX);
        match self {
            Self::AllAtOnce => (params.min_size, target_capacity),
            Self::OneThenAllWithCanary => {
                let canary_healthy = instances.healthy_unhealthy_terminating().0 >= 1;
                if k <= 1 && !canary_healthy {
                    (1, 1)
                } else {
                    (params.min_size, target_capacity)
                }
            }
            Self::TwentyFivePercentStep => step_ratio(params.min_size, target_capacity, k, 4),
            Self::TenPercentStep => step_ratio(params.min_size, target_capacity, k, 10),
            Self::NAtATime { n } => {
                let desired = (k + n).min(target_capacity).max(1);
                (1, desired)
            }
        }
    }

    /// Whether the number of terminating instances breaches this service's
    /// tolerance, a fatal condition for the deploy.
    #[must_use]
    pub fn reached_max_terminations(&self, params: &AutoscalingParams, instances: &Instances) -> bool {
        let (_, _, terminating) = instances.healthy_unhealthy_terminating();
        let limit = self.max_terminations_now(params, instances);
        u32::try_from(terminating).unwrap_or(u32::MAX) > limit
    }

    fn max_terminations_now(&self, params: &AutoscalingParams, instances: &Instances) -> u32 {
        if let Self::OneThenAllWithCanary = self {
            let k = u32::try_from(instances.len()).unwrap_or(u32::MAX);
            let canary_healthy = instances.healthy_unhealthy_terminating().0 >= 1;
            if k <= 1 && !canary_healthy {
                return 0;
            }
        }
        params.max_terminations
    }
}

fn step_ratio(min_size: u32, target_capacity: u32, k: u32, denominator: u32) -> u32 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let factor = 1.0 + f64::from(k) / f64::from(denominator);
    let min = (f64::from(min_size) * factor).ceil();
    let dc = (f64::from(target_capacity) * factor).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    {
        (min.max(0.0) as u32, dc.max(0.0).min(f64::from(target_capacity.max(min_size))) as u32)
    }
}
