//! The object-store seam: release documents, user-data, and the
//! per-project/config lock and halt objects all live behind this trait.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reading, writing, or deleting an object.
#[derive(Error, Debug, Clone)]
#[error("object store error on key '{key}': {reason}")]
pub struct ObjectStoreError {
    /// Key that was being operated on.
    pub key: String,
    /// Underlying reason.
    pub reason: String,
}

/// Result type alias for object-store operations.
pub type Result<T> = std::result::Result<T, ObjectStoreError>;

/// Minimal key/value object-store operations, with the conditional write
/// the lock layer needs to implement create-if-absent semantics.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `value` at `key` only if nothing is currently stored there.
    /// Returns `true` if the write happened.
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool>;

    /// Writes `value` at `key` unconditionally, overwriting any existing
    /// value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Reads the value at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deletes `key`. Not an error if it doesn't exist.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// An in-memory [`ObjectStore`], used by tests and by local/dry-run
/// invocations of the CLI.
#[derive(Default)]
pub struct MemoryObjectStore {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put_if_absent(&self, key: &str, value: &[u8]) -> Result<bool> {
        let mut data = self.data.lock().expect("object store mutex poisoned");
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data
            .lock()
            .expect("object store mutex poisoned")
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .data
            .lock()
            .expect("object store mutex poisoned")
            .get(key)
            .cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().expect("object store mutex poisoned").remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_if_absent_only_succeeds_once() {
        let store = MemoryObjectStore::default();
        assert!(store.put_if_absent("k", b"a").await.unwrap());
        assert!(!store.put_if_absent("k", b"b").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn put_overwrites_unconditionally() {
        let store = MemoryObjectStore::default();
        store.put("k", b"a").await.unwrap();
        store.put("k", b"b").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"b".to_vec()));
    }

    #[tokio::test]
    async fn delete_missing_key_is_not_an_error() {
        let store = MemoryObjectStore::default();
        store.delete("missing").await.unwrap();
    }
}
