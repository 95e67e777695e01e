//! Live-session controller.
//!
//! Follows one occurrence of one event. Each sample answers "what phase,
//! how far in, is chat open" - until the evaluator's current occurrence no
//! longer matches the tracked one (it fully elapsed and a new one began,
//! or none remains). That is a session-over signal: the consumer exits the
//! live view rather than silently jumping into the middle of the next
//! occurrence. The signal fires at most once.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rally_engine::event::{EventDefinition, Occurrence};
use rally_engine::phase::{PhaseSample, chat_enabled, phase_at};
use rally_engine::recurrence::next_occurrence;
use tokio::sync::watch;

use crate::error::{ServiceError, ServiceResult};
use crate::ticker::{TaskGuard, poll_interval};

/// One sampled view of the tracked occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    Active {
        sample: PhaseSample,
        chat_enabled: bool,
    },
    /// The tracked occurrence is over (or the event has no occurrences
    /// left). Leave the live view.
    SessionOver,
}

/// Tracks one occurrence until it is over.
#[derive(Debug, Clone)]
pub struct LiveSessionController {
    definition: EventDefinition,
    tracked: Occurrence,
    exited: bool,
}

impl LiveSessionController {
    /// ## Summary
    /// Starts tracking the occurrence in progress (or next to start) as of
    /// `now`.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` when the event has no occurrence
    /// whose end is still ahead.
    pub fn new(definition: EventDefinition, now: DateTime<Utc>) -> ServiceResult<Self> {
        let tracked = next_occurrence(&definition, now).ok_or_else(|| {
            ServiceError::NotFound(format!("event {} has no upcoming occurrence", definition.id))
        })?;
        Ok(Self {
            definition,
            tracked,
            exited: false,
        })
    }

    #[must_use]
    pub const fn tracked_occurrence(&self) -> Occurrence {
        self.tracked
    }

    /// Current status without advancing the session-over latch.
    #[must_use]
    pub fn status(&self, now: DateTime<Utc>) -> LiveStatus {
        match next_occurrence(&self.definition, now) {
            Some(current) if current.start == self.tracked.start => {
                let sample = phase_at(self.definition.durations, self.tracked.start, now);
                LiveStatus::Active {
                    sample,
                    chat_enabled: chat_enabled(sample.phase),
                }
            }
            _ => LiveStatus::SessionOver,
        }
    }

    /// ## Summary
    /// Samples the clock. Returns `SessionOver` exactly once - on the
    /// first sample after the tracked occurrence's identity no longer
    /// matches - and `None` on every sample after that.
    pub fn sample(&mut self, now: DateTime<Utc>) -> Option<LiveStatus> {
        if self.exited {
            return None;
        }
        let status = self.status(now);
        if status == LiveStatus::SessionOver {
            self.exited = true;
            tracing::debug!(
                event = %self.definition.id,
                occurrence_start = %self.tracked.start,
                "tracked occurrence is over"
            );
        }
        Some(status)
    }
}

/// A running live-session poll; dropping it cancels the poll.
#[derive(Debug)]
pub struct LiveSessionHandle {
    updates: watch::Receiver<LiveStatus>,
    _guard: TaskGuard,
}

impl LiveSessionHandle {
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<LiveStatus> {
        self.updates.clone()
    }
}

/// ## Summary
/// Spawns a poll that samples the controller every `period` and publishes
/// on a watch channel. The task ends itself after publishing
/// `SessionOver`.
///
/// ## Errors
/// Returns `ServiceError::NotFound` when the event has no occurrence left
/// to track.
pub fn spawn_live_session(
    definition: EventDefinition,
    now: DateTime<Utc>,
    period: Duration,
) -> ServiceResult<LiveSessionHandle> {
    let mut controller = LiveSessionController::new(definition, now)?;
    let (tx, rx) = watch::channel(controller.status(now));

    let guard = TaskGuard::spawn(async move {
        let mut ticker = poll_interval(period);
        loop {
            ticker.tick().await;
            let Some(status) = controller.sample(Utc::now()) else {
                break;
            };
            if tx.send(status).is_err() {
                // Every receiver is gone; the view was torn down.
                break;
            }
            if status == LiveStatus::SessionOver {
                break;
            }
        }
    });

    Ok(LiveSessionHandle {
        updates: rx,
        _guard: guard,
    })
}
