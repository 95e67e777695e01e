//! Join service and overflow reassignment job.
//!
//! The assigner decides, the batch store's conditional add-member
//! persists, and a lost race (someone else took the last seat between
//! snapshot and write) re-snapshots and retries. After any membership
//! change the reassignment job recomputes the overflow flag on the event
//! record, with the same predicate the assigner uses, so the stored flag
//! and live decisions always agree.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rally_core::types::{EventId, UserId};
use rally_engine::batch::{BatchSnapshot, JoinKind, choose_batch_for_join, overflow_eligible};
use rally_store::batch::{AddMemberOutcome, BatchStore};
use rally_store::error::StoreError;
use rally_store::event::EventStore;
use tokio::sync::watch;

use crate::error::{ServiceError, ServiceResult};
use crate::ticker::{TaskGuard, poll_interval};

/// Where a join landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinOutcome {
    pub batch_number: u32,
    /// True when the participant was already a member (idempotent re-join).
    pub rejoined: bool,
}

pub struct JoinService {
    events: Arc<dyn EventStore>,
    batches: Arc<dyn BatchStore>,
    overflow_threshold: u32,
    retry_limit: u32,
}

impl JoinService {
    #[must_use]
    pub fn new(
        events: Arc<dyn EventStore>,
        batches: Arc<dyn BatchStore>,
        overflow_threshold: u32,
        retry_limit: u32,
    ) -> Self {
        Self {
            events,
            batches,
            overflow_threshold,
            retry_limit,
        }
    }

    /// ## Summary
    /// Joins `user` to the event, routing through the assigner and the
    /// store's atomic conditional add-member. Re-snapshots and retries
    /// when a concurrent joiner wins the seat or the snapshot goes stale.
    ///
    /// ## Errors
    /// - `ServiceError::NotFound` when the event does not exist.
    /// - `ServiceError::Conflict` when every attempt lost the race; the
    ///   caller may retry with fresh input.
    pub fn join(&self, event: EventId, user: UserId, now: DateTime<Utc>) -> ServiceResult<JoinOutcome> {
        let record = self
            .events
            .get(event)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event}")))?;
        let capacity = record.definition.capacity_per_batch;

        for attempt in 0..=self.retry_limit {
            let snapshot = self.batches.batches_for(event)?;
            let decision = choose_batch_for_join(&snapshot, user, capacity, self.overflow_threshold);

            if decision.kind == JoinKind::AlreadyMember {
                return Ok(JoinOutcome {
                    batch_number: decision.batch_number,
                    rejoined: true,
                });
            }

            let limit = decision.member_limit(capacity, self.overflow_threshold);
            match self
                .batches
                .add_member_if_within(event, decision.batch_number, user, limit)
            {
                Ok(AddMemberOutcome::Added) => {
                    tracing::info!(
                        %event,
                        %user,
                        batch_number = decision.batch_number,
                        kind = ?decision.kind,
                        "joined batch"
                    );
                    self.reassess_overflow(event, now)?;
                    return Ok(JoinOutcome {
                        batch_number: decision.batch_number,
                        rejoined: false,
                    });
                }
                Ok(AddMemberOutcome::AlreadyPresent) => {
                    return Ok(JoinOutcome {
                        batch_number: decision.batch_number,
                        rejoined: true,
                    });
                }
                Ok(AddMemberOutcome::Full) => {
                    tracing::debug!(
                        %event,
                        batch_number = decision.batch_number,
                        attempt,
                        "batch filled between snapshot and write; retrying"
                    );
                }
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(%event, attempt, %reason, "stale batch decision; retrying");
                }
                Err(err) => return Err(err.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "join for event {event} lost the batch race; retry"
        )))
    }

    /// ## Summary
    /// Removes `user` from whichever batch holds them, then re-evaluates
    /// the overflow flag. Idempotent.
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    pub fn leave(&self, event: EventId, user: UserId, now: DateTime<Utc>) -> ServiceResult<bool> {
        let snapshot = self.batches.batches_for(event)?;
        let Some(batch) = snapshot
            .iter()
            .find(|batch| batch.participants.contains(&user))
        else {
            return Ok(false);
        };

        let removed = self.batches.remove_member(event, batch.batch_number, user)?;
        if removed {
            tracing::info!(%event, %user, batch_number = batch.batch_number, "left batch");
            self.reassess_overflow(event, now)?;
        }
        Ok(removed)
    }

    /// ## Summary
    /// The background reassignment job: recomputes whether the trailing
    /// batch may absorb overflow and writes the flag onto the event record
    /// when it changed. Runs after every membership change. Returns the
    /// current flag value.
    ///
    /// ## Errors
    /// Returns `ServiceError::NotFound` when the event record vanished.
    pub fn reassess_overflow(&self, event: EventId, now: DateTime<Utc>) -> ServiceResult<bool> {
        let mut record = self
            .events
            .get(event)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event}")))?;
        let snapshot = self.batches.batches_for(event)?;
        let flag = overflow_eligible(
            &snapshot,
            record.definition.capacity_per_batch,
            self.overflow_threshold,
        );

        if flag != record.overflow_open {
            tracing::info!(%event, overflow_open = flag, "overflow flag changed");
            record.overflow_open = flag;
            record.updated_at = now;
            self.events.put(record)?;
        }
        Ok(flag)
    }
}

/// A running batch poll; dropping it cancels the poll.
#[derive(Debug)]
pub struct BatchWatchHandle {
    updates: watch::Receiver<Vec<BatchSnapshot>>,
    _guard: TaskGuard,
}

impl BatchWatchHandle {
    #[must_use]
    pub fn updates(&self) -> watch::Receiver<Vec<BatchSnapshot>> {
        self.updates.clone()
    }
}

/// ## Summary
/// Spawns the batch refresh poll a roster view sits on: re-reads the
/// event's batches every `period` and publishes the snapshot whenever it
/// changed.
///
/// ## Errors
/// Returns a storage error if the initial read fails; later read failures
/// are logged and the previous snapshot stands.
pub fn spawn_batch_watch(
    batches: Arc<dyn BatchStore>,
    event: EventId,
    period: Duration,
) -> ServiceResult<BatchWatchHandle> {
    let initial = batches.batches_for(event)?;
    let (tx, rx) = watch::channel(initial);

    let guard = TaskGuard::spawn(async move {
        let mut ticker = poll_interval(period);
        loop {
            ticker.tick().await;
            match batches.batches_for(event) {
                Ok(snapshot) => {
                    if tx.send_if_modified(|current| {
                        if *current == snapshot {
                            false
                        } else {
                            *current = snapshot;
                            true
                        }
                    }) {
                        tracing::trace!(%event, "batch snapshot changed");
                    }
                    if tx.is_closed() {
                        break;
                    }
                }
                Err(err) => tracing::warn!(%event, error = %err, "batch refresh failed"),
            }
        }
    });

    Ok(BatchWatchHandle {
        updates: rx,
        _guard: guard,
    })
}
