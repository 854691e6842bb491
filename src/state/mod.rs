//! Persisted state.
//!
//! Durable key-value storage for JSON documents: the subscription map, the
//! watermark and the pending detail retries. Every write replaces a whole
//! value atomically, so a crash never leaves a half-written document behind.

pub mod file;
pub mod sqlite;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ModwatchError, Result};
use crate::utils::retry::{retry, RetryPolicy};

pub use file::JsonFileStore;
pub use sqlite::SqliteStore;

/// A durable store of raw JSON documents keyed by name.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the document stored under `key`, or `None` if it was never written.
    async fn read_raw(&self, key: &str) -> Result<Option<String>>;

    /// Atomically replace the document stored under `key`.
    async fn write_raw(&self, key: &str, value: String) -> Result<()>;
}

/// Read and decode the document under `key`.
///
/// A document that fails to decode is re-read according to `policy`, which
/// tolerates a concurrent writer. Once attempts run out the result is
/// [`ModwatchError::CorruptState`].
///
/// # Errors
///
/// Returns the backend error if reading fails, or `CorruptState` if the stored
/// document never decodes.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn StateStore,
    key: &str,
    policy: &RetryPolicy,
) -> Result<Option<T>> {
    let what = format!("Reading persisted '{}'", key);
    retry(policy, &what, move || read_once(store, key)).await
}

async fn read_once<T: DeserializeOwned>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.read_raw(key).await? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| ModwatchError::CorruptState {
            key: key.to_string(),
            reason: e.to_string(),
        })
}

/// Encode `value` and store it under `key`.
pub async fn write_json<T: Serialize + ?Sized>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string_pretty(value)?;
    store.write_raw(key, raw).await
}

#[cfg(test)]
pub(crate) mod memory {
    //! In-memory store for tests.

    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryStore {
        values: Mutex<HashMap<String, String>>,
        pub writes: AtomicUsize,
        pub fail_writes: AtomicBool,
    }

    impl MemoryStore {
        pub fn get(&self, key: &str) -> Option<String> {
            self.values.lock().unwrap().get(key).cloned()
        }

        pub fn put(&self, key: &str, value: &str) {
            self.values.lock().unwrap().insert(key.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl StateStore for MemoryStore {
        async fn read_raw(&self, key: &str) -> Result<Option<String>> {
            Ok(self.get(key))
        }

        async fn write_raw(&self, key: &str, value: String) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(ModwatchError::Storage("write refused".to_string()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.values.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }
}
