//! Event records.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rally_core::types::EventId;
use rally_engine::event::EventDefinition;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Stored shape of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub definition: EventDefinition,
    /// Written by the reassignment job: the trailing batch may absorb
    /// joiners beyond nominal capacity.
    pub overflow_open: bool,
    pub updated_at: DateTime<Utc>,
}

impl EventRecord {
    #[must_use]
    pub fn new(definition: EventDefinition, now: DateTime<Utc>) -> Self {
        Self {
            definition,
            overflow_open: false,
            updated_at: now,
        }
    }
}

/// Injected event-document capability.
pub trait EventStore: Send + Sync {
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn get(&self, id: EventId) -> StoreResult<Option<EventRecord>>;

    /// Inserts or replaces the record for its id.
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn put(&self, record: EventRecord) -> StoreResult<()>;

    /// ## Errors
    /// Returns `StoreError::NotFound` if no record exists for `id`.
    fn delete(&self, id: EventId) -> StoreResult<()>;

    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn list(&self) -> StoreResult<Vec<EventRecord>>;
}

/// In-memory event store.
#[derive(Debug, Default)]
pub struct MemoryEventStore {
    records: Mutex<HashMap<EventId, EventRecord>>,
}

impl MemoryEventStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<EventId, EventRecord>> {
        self.records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl EventStore for MemoryEventStore {
    fn get(&self, id: EventId) -> StoreResult<Option<EventRecord>> {
        Ok(self.records().get(&id).cloned())
    }

    fn put(&self, record: EventRecord) -> StoreResult<()> {
        self.records().insert(record.definition.id, record);
        Ok(())
    }

    fn delete(&self, id: EventId) -> StoreResult<()> {
        if self.records().remove(&id).is_none() {
            return Err(crate::error::StoreError::NotFound(format!("event {id}")));
        }
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<EventRecord>> {
        Ok(self.records().values().cloned().collect())
    }
}
