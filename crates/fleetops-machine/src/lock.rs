//! Lock and halt coordination, backed by an object store.
//!
//! Mirrors the release-lock/release-halt model: a lock is a single object
//! keyed by project/config that only the release which wrote it may
//! delete, and a halt is an operator-set flag that pre-empts any in-flight
//! deploy at its next health check. Both expire on their own after a
//! clock-skew window so a crashed machine never wedges a project forever.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fleetops_resources::ObjectStore;
use serde::{Deserialize, Serialize};

use crate::error::{MachineError, Result};

/// A lock older than this is treated as abandoned and may be stolen by a
/// new deploy.
pub const LOCK_STALE_AFTER: Duration = Duration::from_secs(5 * 60);

/// A halt older than this is treated as abandoned and is cleared
/// automatically on next read.
pub const HALT_STALE_AFTER: Duration = Duration::from_secs(2 * 60);

fn store_err(key: &str, err: fleetops_resources::object_store::ObjectStoreError) -> MachineError {
    MachineError::ObjectStoreError {
        key: key.to_string(),
        reason: err.reason,
    }
}

/// The record written at a project/config's lock key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
    /// Release that holds the lock.
    pub release_id: String,
    /// When the lock was acquired.
    pub created_at: DateTime<Utc>,
}

/// The record written at a project/config's halt key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaltRecord {
    /// When the halt was set.
    pub created_at: DateTime<Utc>,
    /// Free-text reason, surfaced by the CLI's `fails`/status views.
    pub reason: String,
}

fn lock_key(project_name: &str, config_name: &str) -> String {
    format!("locks/{project_name}/{config_name}")
}

fn halt_key(project_name: &str, config_name: &str) -> String {
    format!("halts/{project_name}/{config_name}")
}

fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| fleetops_core::Error::UnmarshalError(e).into())
}

fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("lock/halt records always serialize")
}

/// Attempts to acquire the lock for `project_name`/`config_name` on behalf
/// of `release_id`. Steals a stale lock (older than [`LOCK_STALE_AFTER`])
/// rather than waiting for it, since whatever held it is presumed dead.
///
/// # Errors
///
/// Returns [`fleetops_core::Error::LockExistsError`] if a live lock is
/// held by a different release.
pub async fn grab_lock(
    store: &dyn ObjectStore,
    project_name: &str,
    config_name: &str,
    release_id: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let key = lock_key(project_name, config_name);
    let record = LockRecord {
        release_id: release_id.to_string(),
        created_at: now,
    };

    if store
        .put_if_absent(&key, &encode(&record))
        .await
        .map_err(|e| store_err(&key, e))?
    {
        return Ok(());
    }

    let existing: LockRecord = match store.get(&key).await.map_err(|e| store_err(&key, e))? {
        Some(bytes) => decode(&bytes)?,
        None => {
            // Raced with a concurrent delete; retry once by writing
            // unconditionally now that the key is gone.
            store
                .put(&key, &encode(&record))
                .await
                .map_err(|e| store_err(&key, e))?;
            return Ok(());
        }
    };

    if existing.release_id == release_id {
        return Ok(());
    }

    let age = (now - existing.created_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    if age > LOCK_STALE_AFTER {
        store
            .put(&key, &encode(&record))
            .await
            .map_err(|e| store_err(&key, e))?;
        return Ok(());
    }

    Err(fleetops_core::Error::LockExistsError {
        holder: existing.release_id,
    }
    .into())
}

/// Releases the lock, but only if `release_id` is the release that holds
/// it.
///
/// # Errors
///
/// Returns [`fleetops_core::Error::LockError`] if the lock is held by a
/// different release (never delete a lock you don't own) or is already
/// gone.
pub async fn release_lock(
    store: &dyn ObjectStore,
    project_name: &str,
    config_name: &str,
    release_id: &str,
) -> Result<()> {
    let key = lock_key(project_name, config_name);
    let existing: LockRecord = match store.get(&key).await.map_err(|e| store_err(&key, e))? {
        Some(bytes) => decode(&bytes)?,
        None => {
            return Err(fleetops_core::Error::LockError {
                reason: "lock already released".to_string(),
            }
            .into());
        }
    };

    if existing.release_id != release_id {
        return Err(fleetops_core::Error::LockError {
            reason: format!("lock is held by {}, not {release_id}", existing.release_id),
        }
        .into());
    }

    store.delete(&key).await.map_err(|e| store_err(&key, e))
}

/// Checks whether the project/config is currently halted. A halt older
/// than [`HALT_STALE_AFTER`] is cleared and treated as not set.
pub async fn is_halted(
    store: &dyn ObjectStore,
    project_name: &str,
    config_name: &str,
    now: DateTime<Utc>,
) -> Result<bool> {
    let key = halt_key(project_name, config_name);
    let Some(bytes) = store.get(&key).await.map_err(|e| store_err(&key, e))? else {
        return Ok(false);
    };
    let record: HaltRecord = decode(&bytes)?;
    let age = (now - record.created_at).to_std().unwrap_or(Duration::ZERO);
    if age > HALT_STALE_AFTER {
        store.delete(&key).await.map_err(|e| store_err(&key, e))?;
        return Ok(false);
    }
    Ok(true)
}

/// Sets a halt, unconditionally overwriting any existing one. Operators
/// use this to stop an in-flight or future deploy.
pub async fn set_halt(
    store: &dyn ObjectStore,
    project_name: &str,
    config_name: &str,
    reason: impl Into<String>,
    now: DateTime<Utc>,
) -> Result<()> {
    let key = halt_key(project_name, config_name);
    let record = HaltRecord {
        created_at: now,
        reason: reason.into(),
    };
    store.put(&key, &encode(&record)).await.map_err(|e| store_err(&key, e))
}

/// Clears a halt regardless of who set it.
pub async fn remove_halt(
    store: &dyn ObjectStore,
    project_name: &str,
    config_name: &str,
) -> Result<()> {
    let key = halt_key(project_name, config_name);
    store.delete(&key).await.map_err(|e| store_err(&key, e))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use fleetops_resources::MemoryObjectStore;

    use super::*;

    type MemoryStore = MemoryObjectStore;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[tokio::test]
    async fn grab_then_release_round_trips() {
        let store = MemoryStore::default();
        grab_lock(&store, "proj", "conf", "rel-1", at(0)).await.unwrap();
        release_lock(&store, "proj", "conf", "rel-1").await.unwrap();
        grab_lock(&store, "proj", "conf", "rel-2", at(1)).await.unwrap();
    }

    #[tokio::test]
    async fn grab_fails_while_another_release_holds_a_live_lock() {
        let store = MemoryStore::default();
        grab_lock(&store, "proj", "conf", "rel-1", at(0)).await.unwrap();
        let err = grab_lock(&store, "proj", "conf", "rel-2", at(10)).await.unwrap_err();
        assert!(err.is_clean());
    }

    #[tokio::test]
    async fn a_stale_lock_can_be_stolen() {
        let store = MemoryStore::default();
        grab_lock(&store, "proj", "conf", "rel-1", at(0)).await.unwrap();
        grab_lock(&store, "proj", "conf", "rel-2", at(1000)).await.unwrap();
    }

    #[tokio::test]
    async fn only_the_owner_may_release() {
        let store = MemoryStore::default();
        grab_lock(&store, "proj", "conf", "rel-1", at(0)).await.unwrap();
        let err = release_lock(&store, "proj", "conf", "rel-2").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn halt_round_trip_and_expiry() {
        let store = MemoryStore::default();
        assert!(!is_halted(&store, "proj", "conf", at(0)).await.unwrap());
        set_halt(&store, "proj", "conf", "operator request", at(0)).await.unwrap();
        assert!(is_halted(&store, "proj", "conf", at(10)).await.unwrap());
        assert!(!is_halted(&store, "proj", "conf", at(1000)).await.unwrap());
    }

    #[tokio::test]
    async fn remove_halt_clears_it_immediately() {
        let store = MemoryStore::default();
        set_halt(&store, "proj", "conf", "operator request", at(0)).await.unwrap();
        remove_halt(&store, "proj", "conf").await.unwrap();
        assert!(!is_halted(&store, "proj", "conf", at(1)).await.unwrap());
    }
}
