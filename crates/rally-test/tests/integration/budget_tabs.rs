use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, TimeZone, Utc};
use rally_test::core::config::BudgetConfig;
use rally_test::core::time::budget_key;
use rally_test::service::budget::{
    BrowseContext, BudgetClock, spawn_budget_driver,
};
use rally_test::store::kv::{KeyValueStore, MemoryKeyValueStore};

use crate::helpers::noon;

fn config() -> BudgetConfig {
    BudgetConfig {
        daily_limit_seconds: 1260,
        reset_hour: 4,
        reset_minute: 0,
        timezone: "UTC".to_string(),
    }
}

fn open_tab(store: &Arc<MemoryKeyValueStore>) -> BudgetClock {
    BudgetClock::new(
        Arc::clone(store) as Arc<dyn KeyValueStore>,
        &config(),
        noon(),
    )
    .unwrap()
}

/// ## Summary
/// Two tabs share one persisted counter: the second tab opens onto the
/// first tab's remainder, and resuming from a pause re-reads whatever the
/// other tab did meanwhile - further ticks or an explicit reset.
#[test_log::test]
fn tabs_reconcile_through_the_shared_counter() {
    let store = Arc::new(MemoryKeyValueStore::new());

    let tab_a = open_tab(&store);
    tab_a.tick(noon(), BrowseContext::General).unwrap();
    tab_a
        .tick(noon() + TimeDelta::seconds(300), BrowseContext::General)
        .unwrap();
    assert_eq!(tab_a.snapshot().remaining_seconds, 960);

    let tab_b = open_tab(&store);
    assert_eq!(tab_b.snapshot().remaining_seconds, 960);

    // B hides; A keeps browsing; B resumes and adopts the lower value.
    tab_b.set_paused(true, noon() + TimeDelta::seconds(300)).unwrap();
    tab_a
        .tick(noon() + TimeDelta::seconds(500), BrowseContext::General)
        .unwrap();
    tab_b.set_paused(false, noon() + TimeDelta::seconds(500)).unwrap();
    assert_eq!(tab_b.snapshot().remaining_seconds, 760);

    // B hides again; A resets the day; B resumes onto the full budget.
    tab_b.set_paused(true, noon() + TimeDelta::seconds(600)).unwrap();
    tab_a.reset(noon() + TimeDelta::seconds(600)).unwrap();
    tab_b.set_paused(false, noon() + TimeDelta::seconds(700)).unwrap();
    assert_eq!(tab_b.snapshot().remaining_seconds, 1260);
}

/// ## Summary
/// Crossing the fixed local reset time restores the full budget under a
/// new session-day key in every tab, even from an exhausted counter, and
/// the stale key is collected.
#[test_log::test]
fn rollover_is_consistent_across_tabs() {
    let store = Arc::new(MemoryKeyValueStore::new());
    let tab_a = open_tab(&store);
    let tab_b = open_tab(&store);
    let old_key = budget_key(tab_a.snapshot().day_key);

    tab_a.tick(noon(), BrowseContext::General).unwrap();
    tab_a
        .tick(noon() + TimeDelta::hours(2), BrowseContext::General)
        .unwrap();
    assert_eq!(tab_a.snapshot().remaining_seconds, 0);

    let after_reset = Utc.with_ymd_and_hms(2025, 3, 11, 4, 0, 30).unwrap();
    tab_a.tick(after_reset, BrowseContext::General).unwrap();
    tab_b.tick(after_reset, BrowseContext::General).unwrap();

    assert_eq!(tab_a.snapshot().remaining_seconds, 1260);
    assert_eq!(tab_b.snapshot().remaining_seconds, 1260);
    assert_eq!(tab_a.snapshot().day_key, tab_b.snapshot().day_key);
    assert_eq!(store.get(&old_key).unwrap(), None);
}

/// ## Summary
/// The driver task folds another tab's writes into this tab's snapshot
/// without waiting for a visibility change.
#[test_log::test(tokio::test)]
async fn driver_applies_cross_tab_changes() {
    let store = Arc::new(MemoryKeyValueStore::new());
    // The driver samples the real wall clock, so this tab opens on it too.
    let clock = Arc::new(
        BudgetClock::new(
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            &config(),
            Utc::now(),
        )
        .unwrap(),
    );
    let _driver = spawn_budget_driver(
        Arc::clone(&clock),
        Duration::from_millis(20),
        || BrowseContext::General,
    );

    let key = budget_key(clock.snapshot().day_key);
    store.set(&key, "123").unwrap();

    let mut snapshots = clock.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if clock.snapshot().remaining_seconds == 123 {
                break;
            }
            snapshots.changed().await.unwrap();
        }
    })
    .await
    .expect("cross-tab change was not applied in time");
}
