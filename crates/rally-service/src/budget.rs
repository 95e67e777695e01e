//! Session budget clock.
//!
//! Drives the pure budget state machine with wall-clock time and keeps the
//! one authoritative persisted counter per session-day key in the shared
//! device store. Pausing follows page visibility; resuming re-reads the
//! persisted value before trusting anything in memory, because another tab
//! may have ticked it down (or reset it) meanwhile. Crossing the fixed
//! local reset time-of-day swaps to a new key, restores the full limit,
//! and lazily removes stale keys.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use rally_core::config::BudgetConfig;
use rally_core::constants::BUDGET_KEY_PREFIX;
use rally_core::time::{budget_key, next_reset_instant, session_day_key};
use rally_engine::budget::SessionBudget;
use rally_store::kv::{KeyChange, KeyValueStore};
use tokio::sync::{broadcast, mpsc, watch};

use crate::error::ServiceResult;
use crate::ticker::{TaskGuard, poll_interval};

/// What kind of page the device is currently showing.
///
/// Exempt contexts never tick the budget down and never trigger a
/// redirect, even at zero remaining: the budget governs general browsing,
/// not scheduled-event participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowseContext {
    General,
    /// Detail page of a live or upcoming event.
    EventDetail,
    /// The budget-exhausted page itself.
    ExhaustedPage,
}

impl BrowseContext {
    #[must_use]
    pub const fn is_exempt(self) -> bool {
        matches!(self, Self::EventDetail | Self::ExhaustedPage)
    }
}

/// Published to consumers after every observable change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetSnapshot {
    pub day_key: NaiveDate,
    pub remaining_seconds: u32,
    pub paused: bool,
}

/// Leave the current context; fires once per exhaustion transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetRedirect;

#[derive(Debug)]
struct TabState {
    day_key: NaiveDate,
    budget: SessionBudget,
    paused: bool,
    /// Wall-clock instant of the last counted tick; `None` while paused
    /// or before the first tick.
    last_tick: Option<DateTime<Utc>>,
    redirect_sent: bool,
}

pub struct BudgetClock {
    store: Arc<dyn KeyValueStore>,
    tz: Tz,
    reset: NaiveTime,
    daily_limit_seconds: u32,
    state: Mutex<TabState>,
    snapshots: watch::Sender<BudgetSnapshot>,
}

impl BudgetClock {
    /// ## Summary
    /// Opens the clock for this tab: resolves the session-day key for
    /// `now`, adopts the persisted counter for that key (or seeds it with
    /// the full daily limit), and publishes the initial snapshot.
    ///
    /// ## Errors
    /// Returns an error for an invalid budget configuration or a failing
    /// store.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        config: &BudgetConfig,
        now: DateTime<Utc>,
    ) -> ServiceResult<Self> {
        let tz = config.tz()?;
        let reset = config.reset_time()?;
        let daily_limit_seconds = config.daily_limit_seconds;

        let day_key = session_day_key(now, tz, reset);
        let persisted = read_persisted(store.as_ref(), day_key)?;
        let budget = SessionBudget::with_remaining(
            daily_limit_seconds,
            persisted.unwrap_or(daily_limit_seconds),
        );
        if persisted.is_none() {
            store.set(&budget_key(day_key), &budget.remaining_seconds().to_string())?;
        }

        let state = TabState {
            day_key,
            budget,
            paused: false,
            last_tick: None,
            redirect_sent: false,
        };
        let (snapshots, _) = watch::channel(BudgetSnapshot {
            day_key,
            remaining_seconds: budget.remaining_seconds(),
            paused: false,
        });

        tracing::debug!(
            %day_key,
            remaining_seconds = budget.remaining_seconds(),
            "budget clock opened"
        );

        Ok(Self {
            store,
            tz,
            reset,
            daily_limit_seconds,
            state: Mutex::new(state),
            snapshots,
        })
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BudgetSnapshot> {
        self.snapshots.subscribe()
    }

    /// Change feed of the underlying shared store, for the driver task.
    #[must_use]
    pub fn external_changes(&self) -> broadcast::Receiver<KeyChange> {
        self.store.subscribe()
    }

    /// The next instant the daily budget restores, for "resets at ..."
    /// displays.
    #[must_use]
    pub fn next_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_reset_instant(now, self.tz, self.reset)
    }

    #[must_use]
    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self.state();
        BudgetSnapshot {
            day_key: state.day_key,
            remaining_seconds: state.budget.remaining_seconds(),
            paused: state.paused,
        }
    }

    /// ## Summary
    /// Counts the real wall-clock seconds since the previous tick against
    /// the budget, unless paused or in an exempt context. Returns the
    /// redirect signal on the tick that found the budget exhausted, at
    /// most once per transition.
    ///
    /// ## Errors
    /// Returns a storage error if persisting the counter fails.
    pub fn tick(
        &self,
        now: DateTime<Utc>,
        context: BrowseContext,
    ) -> ServiceResult<Option<BudgetRedirect>> {
        let mut state = self.state();
        self.rollover_if_needed(&mut state, now)?;

        if state.paused {
            return Ok(None);
        }
        if context.is_exempt() {
            // Time on exempt pages is free; advance the mark so it is not
            // charged retroactively on the next general-context tick.
            state.last_tick = Some(now);
            return Ok(None);
        }

        let elapsed = state.last_tick.map_or(0, |previous| {
            u64::try_from(now.signed_duration_since(previous).num_seconds()).unwrap_or(0)
        });
        state.last_tick = Some(now);

        if elapsed > 0 {
            state.budget.apply_elapsed(elapsed);
            self.persist(&state)?;
            self.publish(&state);
        }

        if state.budget.is_exhausted() && !state.redirect_sent {
            state.redirect_sent = true;
            tracing::info!(day_key = %state.day_key, "budget exhausted");
            return Ok(Some(BudgetRedirect));
        }
        Ok(None)
    }

    /// ## Summary
    /// Follows page visibility. Resuming re-reads the persisted counter
    /// for the current key before anything else; the in-memory value may
    /// be stale relative to another tab.
    ///
    /// ## Errors
    /// Returns a storage error if the re-read fails.
    pub fn set_paused(&self, paused: bool, now: DateTime<Utc>) -> ServiceResult<()> {
        let mut state = self.state();
        if state.paused == paused {
            return Ok(());
        }
        state.paused = paused;

        if paused {
            state.last_tick = None;
        } else {
            self.rollover_if_needed(&mut state, now)?;
            if let Some(persisted) = read_persisted(self.store.as_ref(), state.day_key)? {
                state.budget.reconcile(persisted);
            }
            state.redirect_sent = state.redirect_sent && state.budget.is_exhausted();
            state.last_tick = Some(now);
        }
        self.publish(&state);
        Ok(())
    }

    /// ## Summary
    /// Restores the full daily limit for the current session-day key and
    /// persists it immediately so other tabs observe the reset.
    ///
    /// ## Errors
    /// Returns a storage error if persisting fails.
    pub fn reset(&self, now: DateTime<Utc>) -> ServiceResult<()> {
        let mut state = self.state();
        self.rollover_if_needed(&mut state, now)?;
        state.budget.refill();
        state.redirect_sent = false;
        self.persist(&state)?;
        self.publish(&state);
        tracing::info!(day_key = %state.day_key, "budget reset");
        Ok(())
    }

    /// ## Summary
    /// Applies a change observed on the shared store. Only the current
    /// key's value matters; the persisted counter is authoritative, so it
    /// is adopted as-is.
    ///
    /// ## Errors
    /// Currently infallible; kept fallible for parity with the other
    /// mutators.
    pub fn apply_external_change(&self, change: &KeyChange) -> ServiceResult<()> {
        let mut state = self.state();
        if change.key != budget_key(state.day_key) {
            return Ok(());
        }
        let Some(value) = change.value.as_deref() else {
            return Ok(());
        };
        match value.parse::<u32>() {
            Ok(remaining) => {
                state.budget.reconcile(remaining);
                state.redirect_sent = state.redirect_sent && state.budget.is_exhausted();
                self.publish(&state);
            }
            Err(err) => {
                tracing::warn!(key = %change.key, error = %err, "ignoring malformed budget value");
            }
        }
        Ok(())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TabState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn rollover_if_needed(
        &self,
        state: &mut TabState,
        now: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let day_key = session_day_key(now, self.tz, self.reset);
        if day_key == state.day_key {
            return Ok(());
        }

        tracing::info!(old_key = %state.day_key, new_key = %day_key, "session day rolled over");
        state.day_key = day_key;
        state.budget.refill();
        state.redirect_sent = false;
        state.last_tick = Some(now);
        self.persist(state)?;
        self.remove_stale_keys(day_key)?;
        self.publish(state);
        Ok(())
    }

    /// Previous days' counters are garbage; collect them lazily.
    fn remove_stale_keys(&self, current: NaiveDate) -> ServiceResult<()> {
        let keep = budget_key(current);
        for key in self.store.keys()? {
            if key.starts_with(BUDGET_KEY_PREFIX) && key != keep {
                self.store.remove(&key)?;
            }
        }
        Ok(())
    }

    fn persist(&self, state: &TabState) -> ServiceResult<()> {
        self.store.set(
            &budget_key(state.day_key),
            &state.budget.remaining_seconds().to_string(),
        )?;
        Ok(())
    }

    fn publish(&self, state: &TabState) {
        self.snapshots
            .send(BudgetSnapshot {
                day_key: state.day_key,
                remaining_seconds: state.budget.remaining_seconds(),
                paused: state.paused,
            })
            .ok();
    }
}

fn read_persisted(store: &dyn KeyValueStore, day_key: NaiveDate) -> ServiceResult<Option<u32>> {
    let Some(raw) = store.get(&budget_key(day_key))? else {
        return Ok(None);
    };
    match raw.parse::<u32>() {
        Ok(remaining) => Ok(Some(remaining)),
        Err(err) => {
            tracing::warn!(%day_key, error = %err, "ignoring malformed persisted budget");
            Ok(None)
        }
    }
}

/// A running budget poll; dropping it cancels the poll.
#[derive(Debug)]
pub struct BudgetDriverHandle {
    pub redirects: mpsc::Receiver<BudgetRedirect>,
    _guard: TaskGuard,
}

/// ## Summary
/// Spawns the periodic driver: ticks the clock every `period` with the
/// context reported by `context`, and folds in changes observed on the
/// shared store (other tabs). Redirect signals are delivered on the
/// returned channel.
#[must_use]
pub fn spawn_budget_driver<C>(
    clock: Arc<BudgetClock>,
    period: Duration,
    context: C,
) -> BudgetDriverHandle
where
    C: Fn() -> BrowseContext + Send + 'static,
{
    let (redirect_tx, redirect_rx) = mpsc::channel(4);
    let mut changes = clock.external_changes();

    let guard = TaskGuard::spawn(async move {
        let mut ticker = poll_interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match clock.tick(Utc::now(), context()) {
                        Ok(Some(redirect)) => {
                            if redirect_tx.send(redirect).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(err) => tracing::error!(error = %err, "budget tick failed"),
                    }
                }
                change = changes.recv() => {
                    match change {
                        Ok(change) => {
                            if let Err(err) = clock.apply_external_change(&change) {
                                tracing::warn!(error = %err, "ignoring external budget change");
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "budget change feed lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    });

    BudgetDriverHandle {
        redirects: redirect_rx,
        _guard: guard,
    }
}
