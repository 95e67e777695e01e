//! Device-local key-value store with external-change notification.
//!
//! Models the browser's per-device storage plus its cross-tab change
//! events: synchronous string get/set keyed storage, and a subscription
//! that surfaces writes made through any handle to the same store. The
//! budget clock persists its one authoritative counter here.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::error::StoreResult;

/// A write observed on the shared store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    /// `None` when the key was removed.
    pub value: Option<String>,
}

/// Injected key-value capability.
pub trait KeyValueStore: Send + Sync {
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn set(&self, key: &str, value: &str) -> StoreResult<()>;

    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn remove(&self, key: &str) -> StoreResult<()>;

    /// All keys currently present. Used for lazy cleanup of stale
    /// session-day entries.
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Subscribes to changes made through any handle to this store.
    fn subscribe(&self) -> broadcast::Receiver<KeyChange>;
}

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// In-memory store shared between "tabs" via `Arc`.
#[derive(Debug)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
    changes: broadcast::Sender<KeyChange>,
}

impl MemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            changes,
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned lock only means another tab panicked mid-write; the
        // map itself is still a plain string table.
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn publish(&self, key: &str, value: Option<&str>) {
        self.changes
            .send(KeyChange {
                key: key.to_string(),
                value: value.map(String::from),
            })
            .ok();
    }
}

impl Default for MemoryKeyValueStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.entries().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.entries().insert(key.to_string(), value.to_string());
        self.publish(key, Some(value));
        Ok(())
    }

    fn remove(&self, key: &str) -> StoreResult<()> {
        let removed = self.entries().remove(key).is_some();
        if removed {
            self.publish(key, None);
        }
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        Ok(self.entries().keys().cloned().collect())
    }

    fn subscribe(&self) -> broadcast::Receiver<KeyChange> {
        self.changes.subscribe()
    }
}
