//! Error types shared across the deploy orchestrator.
//!
//! This module defines the error taxonomy named in the machine's catch
//! lists: each variant corresponds to one of the named "kinds" the state
//! machine routes on, plus an [`Error::is_retryable`] classification used by
//! the retry policy.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building, validating or driving a release
/// through the deploy state machine.
#[derive(Error, Debug)]
pub enum Error {
    /// The release document or its resolved resources failed validation.
    #[error("bad release: {reason}")]
    BadReleaseError {
        /// Reason the release was rejected.
        reason: String,
    },

    /// Another deploy already holds the project/config lock.
    #[error("lock already held by {holder}")]
    LockExistsError {
        /// uuid of the execution currently holding the lock.
        holder: String,
    },

    /// Transient failure acquiring or releasing the lock.
    #[error("lock operation failed: {reason}")]
    LockError {
        /// Underlying reason, usually an object-store transient error.
        reason: String,
    },

    /// The release has timed out or an operator halt flag is set.
    #[error("halted: {reason}")]
    HaltError {
        /// Operator-supplied message, or a timeout description.
        reason: String,
    },

    /// Resource creation failed during the deploy stage.
    #[error("deploy failed for service {service}: {reason}")]
    DeployError {
        /// Name of the service whose resources failed to create.
        service: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Transient failure while checking instance health.
    #[error("health check failed: {reason}")]
    HealthError {
        /// Reason the health check could not complete.
        reason: String,
    },

    /// A scaling group remained attached to a load balancer past the retry
    /// budget.
    #[error("detach failed for group {group}: still attached after retry budget")]
    DetachError {
        /// Name of the scaling group that would not detach.
        group: String,
    },

    /// Teardown of a scaling group's resources failed past the retry budget.
    #[error("clean up failed: {reason}")]
    CleanUpError {
        /// Reason teardown could not complete.
        reason: String,
    },

    /// An unchecked programmer error was caught at a task-handler boundary.
    #[error("panic in task handler: {reason}")]
    PanicError {
        /// Message recovered from the panic payload.
        reason: String,
    },

    /// The release document was rejected by the parser, usually an unknown
    /// top-level key.
    #[error("could not parse release document: {0}")]
    UnmarshalError(#[from] serde_json::Error),
}

impl Error {
    /// Builds a [`Error::BadReleaseError`] from any displayable reason.
    pub fn bad_release(reason: impl Into<String>) -> Self {
        Self::BadReleaseError {
            reason: reason.into(),
        }
    }

    /// Builds a [`Error::HaltError`] from any displayable reason.
    pub fn halt(reason: impl Into<String>) -> Self {
        Self::HaltError {
            reason: reason.into(),
        }
    }

    /// This variant's kind name, as matched by the state machine's catch
    /// edges (`crate::state::CatchEdge::error_kind` in `fleetops-machine`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::BadReleaseError { .. } => "BadReleaseError",
            Self::LockExistsError { .. } => "LockExistsError",
            Self::LockError { .. } => "LockError",
            Self::HaltError { .. } => "HaltError",
            Self::DeployError { .. } => "DeployError",
            Self::HealthError { .. } => "HealthError",
            Self::DetachError { .. } => "DetachError",
            Self::CleanUpError { .. } => "CleanUpError",
            Self::PanicError { .. } => "PanicError",
            Self::UnmarshalError(_) => "UnmarshalError",
        }
    }

    /// Whether the state machine's retry policy should attempt this stage
    /// again in place rather than routing to a catch state immediately.
    ///
    /// Per §7: lock and health errors are transient and worth retrying in
    /// place; bad-release, halt, unmarshal and panic errors are not —
    /// retrying them cannot change the outcome.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockError { .. }
                | Self::HealthError { .. }
                | Self::DetachError { .. }
                | Self::CleanUpError { .. }
        )
    }

    /// Whether this error implies no new cloud resources survived, i.e. the
    /// machine may safely route to `FailureClean` rather than `FailureDirty`.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(
            self,
            Self::BadReleaseError { .. } | Self::LockExistsError { .. } | Self::UnmarshalError(_)
        )
    }
}
