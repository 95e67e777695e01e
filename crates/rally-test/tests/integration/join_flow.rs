use std::collections::BTreeSet;
use std::sync::Arc;

use rally_test::core::types::UserId;
use rally_test::engine::batch::JoinKind;
use rally_test::engine::batch::choose_batch_for_join;
use rally_test::engine::recurrence::RecurrenceRule;
use rally_test::store::batch::BatchStore;
use rally_test::store::event::EventStore;

use crate::helpers::{CAPACITY, OVERFLOW_THRESHOLD, fixture, noon};

#[test_log::test]
fn first_joiner_opens_batch_one() {
    let fx = fixture(RecurrenceRule::Daily { interval_days: 1 });
    let outcome = fx.join_service.join(fx.event, UserId::new(), noon()).unwrap();
    assert_eq!(outcome.batch_number, 1);
}

/// ## Summary
/// Three full batches of 21: a would-be fourth batch of one person is
/// folded into batch 3 instead, and the stored overflow flag agrees with
/// the decision.
#[test_log::test]
fn full_batches_fold_the_trailing_group() {
    let fx = fixture(RecurrenceRule::Daily { interval_days: 1 });

    for batch_number in 1..=3 {
        for _ in 0..CAPACITY {
            fx.batches
                .add_member_if_within(fx.event, batch_number, UserId::new(), CAPACITY)
                .unwrap();
        }
    }

    let outcome = fx.join_service.join(fx.event, UserId::new(), noon()).unwrap();
    assert_eq!(outcome.batch_number, 3);

    let record = fx.events.get(fx.event).unwrap().unwrap();
    assert!(record.overflow_open);

    // Fill batch 3's overflow allowance; the next joiner opens batch 4 and
    // the flag drops.
    for _ in 0..(OVERFLOW_THRESHOLD - 1) {
        assert_eq!(
            fx.join_service.join(fx.event, UserId::new(), noon()).unwrap().batch_number,
            3
        );
    }
    let outcome = fx.join_service.join(fx.event, UserId::new(), noon()).unwrap();
    assert_eq!(outcome.batch_number, 4);
    let record = fx.events.get(fx.event).unwrap().unwrap();
    assert!(!record.overflow_open);
}

/// ## Summary
/// A storm of concurrent joiners: everyone lands in exactly one batch,
/// numbering stays dense from 1, and no batch exceeds capacity plus the
/// overflow allowance.
#[test_log::test]
fn concurrent_join_storm_holds_invariants() {
    let fx = fixture(RecurrenceRule::Daily { interval_days: 1 });
    let join_service = Arc::new(fx.join_service);
    let joiners = 64;

    let handles: Vec<_> = (0..joiners)
        .map(|_| {
            let service = Arc::clone(&join_service);
            let event = fx.event;
            std::thread::spawn(move || service.join(event, UserId::new(), noon()).unwrap())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let batches = fx.batches.batches_for(fx.event).unwrap();
    let numbers: Vec<u32> = batches.iter().map(|batch| batch.batch_number).collect();
    let expected: Vec<u32> = (1..=u32::try_from(batches.len()).unwrap()).collect();
    assert_eq!(numbers, expected, "batch numbering must stay dense");

    let mut seen = BTreeSet::new();
    let mut total = 0;
    for batch in &batches {
        assert!(
            batch.size() <= CAPACITY + OVERFLOW_THRESHOLD,
            "batch {} holds {}",
            batch.batch_number,
            batch.size()
        );
        for member in &batch.participants {
            assert!(seen.insert(*member), "member assigned twice");
            total += 1;
        }
    }
    assert_eq!(total, joiners);
}

#[test_log::test]
fn rejoin_after_the_storm_is_idempotent() {
    let fx = fixture(RecurrenceRule::Daily { interval_days: 1 });
    let member = UserId::new();

    let first = fx.join_service.join(fx.event, member, noon()).unwrap();
    let again = fx.join_service.join(fx.event, member, noon()).unwrap();
    assert_eq!(first.batch_number, again.batch_number);
    assert!(again.rejoined);

    // The pure decision agrees with the persisted outcome.
    let snapshot = fx.batches.batches_for(fx.event).unwrap();
    let decision = choose_batch_for_join(&snapshot, member, CAPACITY, OVERFLOW_THRESHOLD);
    assert_eq!(decision.kind, JoinKind::AlreadyMember);
    assert_eq!(decision.batch_number, first.batch_number);
}

#[test_log::test]
fn deleting_the_event_discards_batches() {
    let fx = fixture(RecurrenceRule::Daily { interval_days: 1 });
    fx.join_service.join(fx.event, UserId::new(), noon()).unwrap();

    fx.event_service.delete(fx.event, fx.organizer).unwrap();
    assert!(fx.batches.batches_for(fx.event).unwrap().is_empty());
    assert!(fx.events.get(fx.event).unwrap().is_none());
}
