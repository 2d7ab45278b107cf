//! # fleetops-machine
//!
//! The deploy state machine (§4): drives one release through
//! Validate → Lock → `ValidateResources` → Deploy → `WaitForDeploy` →
//! (`WaitForHealthy` ⇄ `CheckHealthy`) → Detach → `WaitDetach` → `CleanUp` →
//! a terminal state, per the transition graph in [`state::definition`].
//!
//! Each non-terminal state wraps one task handler in [`handlers`]; a
//! state's [`state::RetryRule`] (if any) retries its handler in place
//! before falling through to a [`state::CatchEdge`]. `ReleaseLockFailure`
//! is the shared best-effort cleanup every failure path funnels through
//! before landing on `FailureClean` or `FailureDirty`.
//!
//! ```rust,ignore
//! use fleetops_machine::{Machine, MachineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MachineConfig::default();
//!     let machine = Machine::new(&config);
//!     let release = machine.run(release, &object_store, &cloud).await;
//!     println!("finished: {}", release.success);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use fleetops_core::release::Release;
use fleetops_core::ReleaseError;
use fleetops_resources::cloud::{CloudResources, ScalingGroupHandle};
use fleetops_resources::object_store::ObjectStore;

pub mod config;
pub mod error;
pub mod handlers;
pub mod lock;
pub mod retry;
pub mod state;

pub use config::{MachineConfig, MachineConfigBuilder};
pub use error::{MachineError, Result};
pub use handlers::DeployContext;
pub use state::MachineState;

/// Drives releases through the deploy state machine.
pub struct Machine<'a> {
    config: &'a MachineConfig,
}

impl<'a> Machine<'a> {
    /// Creates a machine bound to `config`.
    #[must_use]
    pub fn new(config: &'a MachineConfig) -> Self {
        Self { config }
    }

    /// Runs `release` to completion, returning it with `success`/`error`
    /// set to reflect the terminal state reached.
    pub async fn run(
        &self,
        release: Release,
        object_store: &'a dyn ObjectStore,
        cloud: &'a dyn CloudResources,
    ) -> Release {
        let mut ctx = DeployContext {
            release,
            created_groups: HashMap::new(),
            object_store,
            cloud,
            config: self.config,
        };
        let mut detach_targets: Vec<ScalingGroupHandle> = Vec::new();
        let mut state = MachineState::Validate;

        while !state.is_terminal() {
            tracing::info!(
                state = ?state,
                release_id = %ctx.release.release_id,
                project = %ctx.release.project_name,
                config = %ctx.release.config_name,
                "entering state"
            );
            state = self.step(state, &mut ctx, &mut detach_targets).await;
        }
        tracing::info!(
            state = ?state,
            release_id = %ctx.release.release_id,
            project = %ctx.release.project_name,
            config = %ctx.release.config_name,
            "reached terminal state"
        );

        ctx.release.success = state == MachineState::Success;
        ctx.release
    }

    async fn step(
        &self,
        state: MachineState,
        ctx: &mut DeployContext<'a>,
        detach_targets: &mut Vec<ScalingGroupHandle>,
    ) -> MachineState {
        let def = state::definition_for(state);
        match self.run_state(state, &def, ctx, detach_targets).await {
            Ok(next) => next,
            Err(err) => {
                let next = def
                    .catches
                    .iter()
                    .find(|edge| edge.error_kind == err.kind())
                    .map_or_else(
                        || {
                            if err.is_clean() {
                                MachineState::FailureClean
                            } else {
                                MachineState::FailureDirty
                            }
                        },
                        |edge| edge.next,
                    );
                ctx.release.error = Some(ReleaseError {
                    kind: err.kind().to_string(),
                    message: err.to_string(),
                });
                next
            }
        }
    }

    async fn run_state(
        &self,
        state: MachineState,
        def: &state::StateDefinition,
        ctx: &mut DeployContext<'a>,
        detach_targets: &mut Vec<ScalingGroupHandle>,
    ) -> Result<MachineState> {
        let retry = def.retry.as_ref();
        let applies = |err: &MachineError| retry.is_some_and(|r| r.error_kinds.contains(&err.kind()));

        match state {
            MachineState::Validate => {
                retry::with_retry(retry, applies, || handlers::validate(ctx)).await?;
                Ok(def.next.expect("Validate always has a next state"))
            }
            MachineState::Lock => {
                retry::with_retry(retry, applies, || handlers::acquire_lock(ctx, Utc::now())).await?;
                Ok(def.next.expect("Lock always has a next state"))
            }
            MachineState::ValidateResources => {
                retry::with_retry(retry, applies, || handlers::validate_resources(ctx)).await?;
                Ok(def.next.expect("ValidateResources always has a next state"))
            }
            MachineState::Deploy => {
                retry::with_retry(retry, applies, || handlers::deploy(ctx, Utc::now())).await?;
                Ok(def.next.expect("Deploy always has a next state"))
            }
            MachineState::WaitForDeploy => {
                retry::pause(self.config.wait_for_deploy).await;
                Ok(def.next.expect("WaitForDeploy always has a next state"))
            }
            MachineState::WaitForHealthy => {
                retry::pause(Duration::from_secs(u64::from(ctx.release.wait_for_healthy.max(1)))).await;
                Ok(def.next.expect("WaitForHealthy always has a next state"))
            }
            MachineState::CheckHealthy => {
                let healthy = retry::with_retry(retry, applies, || handlers::check_healthy(ctx)).await?;
                if healthy {
                    Ok(MachineState::DetachForSuccess)
                } else {
                    Ok(def.next.expect("CheckHealthy always loops back to WaitForHealthy"))
                }
            }
            MachineState::DetachForSuccess => {
                let groups = retry::with_retry(retry, applies, || handlers::detach(ctx, true)).await?;
                *detach_targets = groups;
                Ok(def.next.expect("DetachForSuccess always has a next state"))
            }
            MachineState::DetachForFailure => {
                let groups = retry::with_retry(retry, applies, || handlers::detach(ctx, false)).await?;
                *detach_targets = groups;
                Ok(def.next.expect("DetachForFailure always has a next state"))
            }
            MachineState::WaitDetachForSuccess | MachineState::WaitDetachForFailure => {
                self.poll_detach_converged(state, ctx, detach_targets).await?;
                Ok(def.next.expect("WaitDetach* always has a next state"))
            }
            MachineState::CleanUpSuccess => {
                let groups = detach_targets.clone();
                retry::with_retry(retry, applies, || handlers::clean_up(ctx, &groups, true)).await?;
                Ok(def.next.expect("CleanUpSuccess always has a next state"))
            }
            MachineState::CleanUpFailure => {
                let groups = detach_targets.clone();
                retry::with_retry(retry, applies, || handlers::clean_up(ctx, &groups, false)).await?;
                Ok(def.next.expect("CleanUpFailure always has a next state"))
            }
            MachineState::ReleaseLockFailure => {
                retry::with_retry(retry, applies, || handlers::release_lock_failure(ctx)).await?;
                Ok(def.next.expect("ReleaseLockFailure always has a next state"))
            }
            MachineState::FailureClean | MachineState::FailureDirty | MachineState::Success => {
                unreachable!("terminal states never reach run_state")
            }
        }
    }

    /// Polls [`handlers::detach_converged`] until it converges or the
    /// sibling `DetachFor*` state's retry budget is exhausted, at which
    /// point this raises the same `DetachError` kind a failed detach call
    /// would, so it is caught the same way (§4.9).
    async fn poll_detach_converged(
        &self,
        state: MachineState,
        ctx: &DeployContext<'a>,
        detach_targets: &[ScalingGroupHandle],
    ) -> Result<()> {
        let sibling = match state {
            MachineState::WaitDetachForSuccess => MachineState::DetachForSuccess,
            MachineState::WaitDetachForFailure => MachineState::DetachForFailure,
            _ => unreachable!("only called for WaitDetach* states"),
        };
        let budget = state::definition_for(sibling).retry;
        let max_attempts = budget.as_ref().map_or(1, |r| r.max_attempts);
        let interval = budget.as_ref().map_or(Duration::from_secs(15), state::RetryRule::interval);

        for attempt in 1..=max_attempts {
            if handlers::detach_converged(ctx, detach_targets).await? {
                return Ok(());
            }
            if attempt < max_attempts {
                retry::pause(interval).await;
            }
        }

        Err(fleetops_core::Error::DetachError {
            group: "detach did not converge within the retry budget".to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetops_resources::cloud::InMemoryCloudResources;
    use fleetops_resources::MemoryObjectStore;

    fn minimal_release() -> Release {
        let json = serde_json::json!({
            "release_id": "r-1",
            "project_name": "proj",
            "config_name": "conf",
            "account_id": "1",
            "region": "us-east-1",
            "bucket": "bucket",
            "timeout_seconds": 1800,
            "ami": "ami-1",
            "subnets": ["subnet-1"],
            "services": {
                "web": {
                    "name": "web",
                    "instance_type": "m5.large",
                    "profile": "web-profile",
                    "security_groups": [],
                    "elbs": [],
                    "target_groups": [],
                    "autoscaling": { "min_size": 0, "max_size": 0, "max_terminations": 1 }
                }
            }
        });
        Release::from_json(&json.to_string()).unwrap()
    }

    #[tokio::test]
    async fn bad_release_routes_straight_to_failure_clean() {
        let store = MemoryObjectStore::default();
        let cloud = InMemoryCloudResources::default();
        let config = MachineConfig::default();
        let machine = Machine::new(&config);

        let mut release = minimal_release();
        release.project_name.clear();

        let finished = machine.run(release, &store, &cloud).await;
        assert!(!finished.success);
        assert_eq!(finished.error.unwrap().kind, "BadReleaseError");
    }

    #[tokio::test]
    async fn a_service_requiring_zero_instances_reaches_success() {
        let store = MemoryObjectStore::default();
        let cloud = InMemoryCloudResources::default();
        let config = MachineConfig::builder()
            .wait_for_deploy(Duration::from_millis(1))
            .build();
        let machine = Machine::new(&config);

        let finished = machine.run(minimal_release(), &store, &cloud).await;
        assert!(finished.success, "{:?}", finished.error);
    }
}
