//! The deploy state machine's states and static transition definition.
//!
//! Mirrors the canonical transition graph (§4.1): each non-terminal state
//! wraps a task handler in [`crate::handlers`]; some states retry in place
//! on a declared set of error kinds before falling through to their catch
//! edge.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One state in the deploy machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineState {
    /// Validate the release document and, if enabled, the safe-release
    /// diff.
    Validate,
    /// Acquire the per-project/config lock.
    Lock,
    /// Resolve and tag-check every referenced cloud resource.
    ValidateResources,
    /// Create launch templates, scaling groups, policies and hooks.
    Deploy,
    /// Fixed 30s pause after deploy before the first health check.
    WaitForDeploy,
    /// Polling pause between health checks, sized from `wait_for_healthy`.
    WaitForHealthy,
    /// Merge instance health and decide whether the release is healthy.
    CheckHealthy,
    /// Detach previous scaling groups on the success path.
    DetachForSuccess,
    /// Poll until detach has converged, success path.
    WaitDetachForSuccess,
    /// Tear down previous scaling groups, reset capacity, release lock.
    CleanUpSuccess,
    /// Detach the scaling groups created by this execution, failure path.
    DetachForFailure,
    /// Poll until detach has converged, failure path.
    WaitDetachForFailure,
    /// Tear down the scaling groups created by this execution.
    CleanUpFailure,
    /// Release the lock after a failure, best-effort.
    ReleaseLockFailure,
    /// Terminal: no new cloud resources survived; safe to retry.
    FailureClean,
    /// Terminal: resources may remain inconsistent; operator triage
    /// required.
    FailureDirty,
    /// Terminal: the release deployed successfully.
    Success,
}

impl MachineState {
    /// Whether this state ends the machine's run.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::FailureClean | Self::FailureDirty | Self::Success)
    }

    /// Canonical name, matching the wire form dumped by the CLI's `json`
    /// subcommand.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Validate => "Validate",
            Self::Lock => "Lock",
            Self::ValidateResources => "ValidateResources",
            Self::Deploy => "Deploy",
            Self::WaitForDeploy => "WaitForDeploy",
            Self::WaitForHealthy => "WaitForHealthy",
            Self::CheckHealthy => "CheckHealthy",
            Self::DetachForSuccess => "DetachForSuccess",
            Self::WaitDetachForSuccess => "WaitDetachForSuccess",
            Self::CleanUpSuccess => "CleanUpSuccess",
            Self::DetachForFailure => "DetachForFailure",
            Self::WaitDetachForFailure => "WaitDetachForFailure",
            Self::CleanUpFailure => "CleanUpFailure",
            Self::ReleaseLockFailure => "ReleaseLockFailure",
            Self::FailureClean => "FailureClean",
            Self::FailureDirty => "FailureDirty",
            Self::Success => "Success",
        }
    }
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A retry rule local to one state: the error kinds it applies to, the
/// maximum number of attempts, and the backoff interval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryRule {
    /// Error-kind names this rule applies to (matches
    /// `fleetops_core::Error`'s variant names).
    pub error_kinds: Vec<&'static str>,
    /// Maximum attempts before falling through to the catch edge.
    pub max_attempts: u32,
    /// Seconds to wait between attempts.
    pub interval_seconds: u64,
}

impl RetryRule {
    const fn new(error_kinds: Vec<&'static str>, max_attempts: u32, interval_seconds: u64) -> Self {
        Self {
            error_kinds,
            max_attempts,
            interval_seconds,
        }
    }

    /// The backoff interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

/// A catch edge: which error kind routes to which next state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchEdge {
    /// Error-kind name this edge matches.
    pub error_kind: &'static str,
    /// State to transition to.
    pub next: MachineState,
}

/// The full definition of one state: its successful-path transition, its
/// catch edges, and any in-place retry rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDefinition {
    /// The state this definition describes.
    pub state: MachineState,
    /// Next state on success, if this state is non-terminal.
    pub next: Option<MachineState>,
    /// Error-kind to next-state routing.
    pub catches: Vec<CatchEdge>,
    /// In-place retry rule, if any.
    pub retry: Option<RetryRule>,
}

fn catch(error_kind: &'static str, next: MachineState) -> CatchEdge {
    CatchEdge { error_kind, next }
}

/// The canonical transition graph (§4.1), in the order a successful deploy
/// visits them.
#[must_use]
pub fn definition() -> Vec<StateDefinition> {
    use MachineState::{
        CheckHealthy, CleanUpFailure, CleanUpSuccess, Deploy, DetachForFailure, DetachForSuccess,
        FailureClean, FailureDirty, Lock, ReleaseLockFailure, Success, Validate,
        ValidateResources, WaitDetachForFailure, WaitDetachForSuccess, WaitForDeploy,
        WaitForHealthy,
    };

    vec![
        StateDefinition {
            state: Validate,
            next: Some(Lock),
            catches: vec![
                catch("BadReleaseError", FailureClean),
                catch("UnmarshalError", FailureClean),
                catch("ObjectStoreError", FailureClean),
                catch("PanicError", FailureClean),
            ],
            retry: None,
        },
        StateDefinition {
            state: Lock,
            next: Some(ValidateResources),
            catches: vec![
                catch("LockExistsError", FailureClean),
                catch("LockError", ReleaseLockFailure),
                catch("ObjectStoreError", ReleaseLockFailure),
                catch("PanicError", ReleaseLockFailure),
            ],
            retry: Some(RetryRule::new(vec!["LockError", "ObjectStoreError"], 3, 5)),
        },
        StateDefinition {
            state: ValidateResources,
            next: Some(Deploy),
            catches: vec![catch("BadReleaseError", ReleaseLockFailure)],
            retry: None,
        },
        StateDefinition {
            state: Deploy,
            next: Some(WaitForDeploy),
            catches: vec![
                catch("HaltError", ReleaseLockFailure),
                catch("ObjectStoreError", ReleaseLockFailure),
                catch("DeployError", DetachForFailure),
                catch("PanicError", DetachForFailure),
            ],
            retry: None,
        },
        StateDefinition {
            state: WaitForDeploy,
            next: Some(WaitForHealthy),
            catches: vec![],
            retry: None,
        },
        StateDefinition {
            state: WaitForHealthy,
            next: Some(CheckHealthy),
            catches: vec![],
            retry: None,
        },
        StateDefinition {
            state: CheckHealthy,
            // Loops back to WaitForHealthy until either healthy or halted;
            // the driver chooses the edge based on the handler's outcome
            // rather than this single `next`.
            next: Some(WaitForHealthy),
            catches: vec![
                catch("HaltError", DetachForFailure),
                catch("HealthError", DetachForFailure),
            ],
            retry: Some(RetryRule::new(vec!["HealthError"], 3, 10)),
        },
        StateDefinition {
            state: DetachForSuccess,
            next: Some(WaitDetachForSuccess),
            catches: vec![],
            retry: Some(RetryRule::new(vec!["DetachError"], 60, 15)),
        },
        StateDefinition {
            state: WaitDetachForSuccess,
            next: Some(CleanUpSuccess),
            catches: vec![catch("DetachError", FailureDirty)],
            retry: None,
        },
        StateDefinition {
            state: CleanUpSuccess,
            next: Some(Success),
            catches: vec![catch("CleanUpError", FailureDirty)],
            retry: Some(RetryRule::new(vec!["CleanUpError"], 3, 10)),
        },
        StateDefinition {
            state: DetachForFailure,
            next: Some(WaitDetachForFailure),
            catches: vec![],
            retry: Some(RetryRule::new(vec!["DetachError"], 10, 15)),
        },
        StateDefinition {
            state: WaitDetachForFailure,
            next: Some(CleanUpFailure),
            catches: vec![catch("DetachError", FailureDirty)],
            retry: None,
        },
        StateDefinition {
            state: CleanUpFailure,
            next: Some(ReleaseLockFailure),
            catches: vec![catch("CleanUpError", FailureDirty)],
            retry: Some(RetryRule::new(vec!["CleanUpError"], 3, 10)),
        },
        StateDefinition {
            state: ReleaseLockFailure,
            next: Some(FailureClean),
            catches: vec![
                catch("LockError", FailureDirty),
                catch("ObjectStoreError", FailureDirty),
            ],
            retry: Some(RetryRule::new(vec!["LockError", "ObjectStoreError"], 3, 5)),
        },
        StateDefinition {
            state: FailureClean,
            next: None,
            catches: vec![],
            retry: None,
        },
        StateDefinition {
            state: FailureDirty,
            next: None,
            catches: vec![],
            retry: None,
        },
        StateDefinition {
            state: Success,
            next: None,
            catches: vec![],
            retry: None,
        },
    ]
}

/// Looks up one state's definition.
#[must_use]
pub fn definition_for(state: MachineState) -> StateDefinition {
    definition()
        .into_iter()
        .find(|d| d.state == state)
        .unwrap_or_else(|| unreachable!("every MachineState has an entry in definition()"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(MachineState::Success.is_terminal());
        assert!(MachineState::FailureClean.is_terminal());
        assert!(MachineState::FailureDirty.is_terminal());
        assert!(!MachineState::Validate.is_terminal());
        assert!(!MachineState::CheckHealthy.is_terminal());
    }

    #[test]
    fn every_state_has_a_definition() {
        let defs = definition();
        for state in [
            MachineState::Validate,
            MachineState::Lock,
            MachineState::ValidateResources,
            MachineState::Deploy,
            MachineState::WaitForDeploy,
            MachineState::WaitForHealthy,
            MachineState::CheckHealthy,
            MachineState::DetachForSuccess,
            MachineState::WaitDetachForSuccess,
            MachineState::CleanUpSuccess,
            MachineState::DetachForFailure,
            MachineState::WaitDetachForFailure,
            MachineState::CleanUpFailure,
            MachineState::ReleaseLockFailure,
            MachineState::FailureClean,
            MachineState::FailureDirty,
            MachineState::Success,
        ] {
            assert!(defs.iter().any(|d| d.state == state), "missing {state}");
        }
    }

    #[test]
    fn validate_bad_release_routes_to_failure_clean() {
        let def = definition_for(MachineState::Validate);
        let edge = def
            .catches
            .iter()
            .find(|c| c.error_kind == "BadReleaseError")
            .unwrap();
        assert_eq!(edge.next, MachineState::FailureClean);
    }

    #[test]
    fn lock_exists_is_terminal_clean_but_lock_error_routes_to_release_lock_failure() {
        let def = definition_for(MachineState::Lock);
        assert_eq!(
            def.catches
                .iter()
                .find(|c| c.error_kind == "LockExistsError")
                .unwrap()
                .next,
            MachineState::FailureClean
        );
        assert_eq!(
            def.catches
                .iter()
                .find(|c| c.error_kind == "LockError")
                .unwrap()
                .next,
            MachineState::ReleaseLockFailure
        );
    }

    #[test]
    fn deploy_failure_routes_through_detach_then_cleanup_then_release_lock() {
        let deploy = definition_for(MachineState::Deploy);
        assert_eq!(
            deploy
                .catches
                .iter()
                .find(|c| c.error_kind == "DeployError")
                .unwrap()
                .next,
            MachineState::DetachForFailure
        );
        assert_eq!(
            definition_for(MachineState::DetachForFailure).next,
            Some(MachineState::WaitDetachForFailure)
        );
        assert_eq!(
            definition_for(MachineState::WaitDetachForFailure).next,
            Some(MachineState::CleanUpFailure)
        );
        assert_eq!(
            definition_for(MachineState::CleanUpFailure).next,
            Some(MachineState::ReleaseLockFailure)
        );
    }
}
