use std::time::Duration;

use chrono::{TimeDelta, Utc};
use rally_test::core::types::{EventId, UserId};
use rally_test::engine::event::{EventDefinition, PhaseDurations};
use rally_test::engine::phase::Phase;
use rally_test::engine::recurrence::RecurrenceRule;
use rally_test::service::live::{
    LiveSessionController, LiveStatus, spawn_live_session,
};

use crate::helpers::{definition, noon};

/// ## Summary
/// Walks one recurring occurrence through all three phases and out the
/// other side: the controller reports each phase with the chat gate, then
/// signals session-over exactly once when the evaluator moves on to the
/// next occurrence.
#[test_log::test]
fn one_occurrence_start_to_finish() {
    let def = definition(UserId::new(), RecurrenceRule::Daily { interval_days: 1 });
    let start = def.start;
    let mut controller = LiveSessionController::new(def, noon()).unwrap();
    assert_eq!(controller.tracked_occurrence().start, start);

    let expectations = [
        (-60, Phase::Arrival, true),
        (60, Phase::Arrival, true),
        (400, Phase::Practice, false),
        (1600, Phase::Close, true),
    ];
    for (offset, phase, chat) in expectations {
        let status = controller.sample(start + TimeDelta::seconds(offset)).unwrap();
        let LiveStatus::Active {
            sample,
            chat_enabled,
        } = status
        else {
            panic!("expected active status at offset {offset}");
        };
        assert_eq!(sample.phase, phase, "offset {offset}");
        assert_eq!(chat_enabled, chat, "offset {offset}");
    }

    let after = start + TimeDelta::seconds(1801);
    assert_eq!(controller.sample(after), Some(LiveStatus::SessionOver));
    assert_eq!(controller.sample(after + TimeDelta::seconds(1)), None);
}

/// ## Summary
/// The spawned poll publishes status until the occurrence ends, then
/// delivers the session-over signal and stops itself.
#[test_log::test(tokio::test)]
async fn spawned_poll_signals_session_over() {
    let now = Utc::now();
    let def = EventDefinition {
        id: EventId::new(),
        start: now,
        durations: PhaseDurations {
            arrival_seconds: 1,
            practice_seconds: 0,
            close_seconds: 0,
        },
        recurrence: RecurrenceRule::None,
        capacity_per_batch: 21,
        created_by: UserId::new(),
    };

    let handle = spawn_live_session(def, now, Duration::from_millis(50)).unwrap();
    let mut updates = handle.updates();

    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if *updates.borrow_and_update() == LiveStatus::SessionOver {
                break;
            }
            if updates.changed().await.is_err() {
                panic!("poll ended without a session-over signal");
            }
        }
    })
    .await
    .expect("session-over signal did not arrive in time");
}
