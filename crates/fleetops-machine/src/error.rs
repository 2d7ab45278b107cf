//! Error types for the orchestration crate.
//!
//! Wraps [`fleetops_core::Error`], the taxonomy the state machine's catch
//! lists route on, with the handful of machine-local error conditions that
//! have no counterpart in the release/service data model: raw object-store
//! failures and panics recovered at the task-handler boundary.

use thiserror::Error;

/// Result type alias for machine operations.
pub type Result<T> = std::result::Result<T, MachineError>;

/// Errors that can occur while driving a release through the machine.
#[derive(Error, Debug)]
pub enum MachineError {
    /// A release/service-level error from the core data model.
    #[error(transparent)]
    Core(#[from] fleetops_core::Error),

    /// The object store backing the lock/halt layer failed.
    #[error("object store error on key '{key}': {reason}")]
    ObjectStoreError {
        /// Key that was being read, written or deleted.
        key: String,
        /// Underlying reason.
        reason: String,
    },
}

impl MachineError {
    /// Whether the retry policy should attempt this stage again in place.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Core(e) => e.is_retryable(),
            Self::ObjectStoreError { .. } => true,
        }
    }

    /// Whether this error implies no new cloud resources survived.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        match self {
            Self::Core(e) => e.is_clean(),
            Self::ObjectStoreError { .. } => false,
        }
    }

    /// This error's kind name, as matched by the state machine's catch
    /// edges ([`crate::state::CatchEdge::error_kind`]).
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Core(e) => e.kind(),
            Self::ObjectStoreError { .. } => "ObjectStoreError",
        }
    }
}
