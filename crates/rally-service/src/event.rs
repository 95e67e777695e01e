//! Event lifecycle.
//!
//! Definitions are immutable values; an edit replaces the whole record.
//! Only the organizer who created an event may edit or delete it, edits
//! are refused while an occurrence is live, and deletion discards the
//! event's batches with it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rally_core::types::{EventId, UserId};
use rally_engine::event::EventDefinition;
use rally_engine::recurrence::is_live;
use rally_store::batch::BatchStore;
use rally_store::event::{EventRecord, EventStore};

use crate::error::{ServiceError, ServiceResult};

pub struct EventService {
    events: Arc<dyn EventStore>,
    batches: Arc<dyn BatchStore>,
}

impl EventService {
    #[must_use]
    pub fn new(events: Arc<dyn EventStore>, batches: Arc<dyn BatchStore>) -> Self {
        Self { events, batches }
    }

    /// ## Summary
    /// Validates and stores a new event.
    ///
    /// ## Errors
    /// - `ServiceError::Conflict` when the id is already taken.
    /// - Validation errors from the definition.
    pub fn create(
        &self,
        definition: EventDefinition,
        now: DateTime<Utc>,
    ) -> ServiceResult<EventRecord> {
        definition.validate()?;
        if self.events.get(definition.id)?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "event {} already exists",
                definition.id
            )));
        }

        let record = EventRecord::new(definition, now);
        self.events.put(record.clone())?;
        tracing::info!(event = %record.definition.id, "event created");
        Ok(record)
    }

    /// ## Summary
    /// Replaces the definition. Allowed only for the creating organizer,
    /// and only while no occurrence is live.
    ///
    /// ## Errors
    /// - `ServiceError::NotFound` when the event does not exist.
    /// - `ServiceError::AuthorizationError` when `actor` is not the
    ///   creator, or the edit tries to reassign ownership.
    /// - `ServiceError::Conflict` while an occurrence is in progress.
    pub fn update(
        &self,
        definition: EventDefinition,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> ServiceResult<EventRecord> {
        let existing = self
            .events
            .get(definition.id)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {}", definition.id)))?;

        if existing.definition.created_by != actor {
            return Err(ServiceError::AuthorizationError(format!(
                "event {} belongs to another organizer",
                definition.id
            )));
        }
        if definition.created_by != existing.definition.created_by {
            return Err(ServiceError::AuthorizationError(
                "events cannot change owner".to_string(),
            ));
        }
        if is_live(&existing.definition, now) {
            return Err(ServiceError::Conflict(format!(
                "event {} has a live occurrence",
                definition.id
            )));
        }
        definition.validate()?;

        let record = EventRecord {
            definition,
            overflow_open: existing.overflow_open,
            updated_at: now,
        };
        self.events.put(record.clone())?;
        tracing::info!(event = %record.definition.id, "event updated");
        Ok(record)
    }

    /// ## Summary
    /// Deletes the event and discards its batches.
    ///
    /// ## Errors
    /// - `ServiceError::NotFound` when the event does not exist.
    /// - `ServiceError::AuthorizationError` when `actor` is not the
    ///   creator.
    pub fn delete(&self, id: EventId, actor: UserId) -> ServiceResult<()> {
        let existing = self
            .events
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {id}")))?;
        if existing.definition.created_by != actor {
            return Err(ServiceError::AuthorizationError(format!(
                "event {id} belongs to another organizer"
            )));
        }

        self.events.delete(id)?;
        self.batches.delete_event_batches(id)?;
        tracing::info!(event = %id, "event deleted with its batches");
        Ok(())
    }
}
