use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rally_test::core::config::SessionConfig;
use rally_test::core::types::{EventId, UserId};
use rally_test::engine::event::{EventDefinition, PhaseDurations};
use rally_test::engine::recurrence::RecurrenceRule;
use rally_test::service::event::EventService;
use rally_test::service::join::JoinService;
use rally_test::store::batch::{BatchStore, MemoryBatchStore};
use rally_test::store::event::{EventStore, MemoryEventStore};

pub const CAPACITY: u32 = 21;
pub const OVERFLOW_THRESHOLD: u32 = 6;

pub fn session_config() -> SessionConfig {
    SessionConfig {
        overflow_threshold: OVERFLOW_THRESHOLD,
        phase_poll_seconds: 1,
        batch_refresh_seconds: 10,
        join_retry_limit: 3,
    }
}

pub fn noon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
}

pub fn definition(owner: UserId, recurrence: RecurrenceRule) -> EventDefinition {
    EventDefinition {
        id: EventId::new(),
        start: Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap(),
        durations: PhaseDurations {
            arrival_seconds: 300,
            practice_seconds: 1200,
            close_seconds: 300,
        },
        recurrence,
        capacity_per_batch: CAPACITY,
        created_by: owner,
    }
}

/// Shared fixture: one event in fresh stores plus the services over them.
pub struct Fixture {
    pub events: Arc<MemoryEventStore>,
    pub batches: Arc<MemoryBatchStore>,
    pub event_service: EventService,
    pub join_service: JoinService,
    pub event: EventId,
    pub organizer: UserId,
}

pub fn fixture(recurrence: RecurrenceRule) -> Fixture {
    let events = Arc::new(MemoryEventStore::new());
    let batches = Arc::new(MemoryBatchStore::new());
    let organizer = UserId::new();

    let event_service = EventService::new(
        Arc::clone(&events) as Arc<dyn EventStore>,
        Arc::clone(&batches) as Arc<dyn BatchStore>,
    );
    let session = session_config();
    let join_service = JoinService::new(
        Arc::clone(&events) as Arc<dyn EventStore>,
        Arc::clone(&batches) as Arc<dyn BatchStore>,
        session.overflow_threshold,
        session.join_retry_limit,
    );

    let def = definition(organizer, recurrence);
    let event = def.id;
    event_service.create(def, noon()).unwrap();

    Fixture {
        events,
        batches,
        event_service,
        join_service,
        event,
        organizer,
    }
}
