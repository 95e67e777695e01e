//! Batch membership storage.
//!
//! The one write primitive is `add_member_if_within`: an atomic
//! check-and-union that either admits the participant under the given size
//! limit or reports the batch full. Concurrent joiners can never both take
//! the last seat, and a stale assignment decision surfaces as a retryable
//! `Full` rather than overwriting anyone's membership.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use rally_core::types::{EventId, UserId};
use rally_engine::batch::BatchSnapshot;

use crate::error::{StoreError, StoreResult};

/// Result of the conditional add-member write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMemberOutcome {
    Added,
    /// Idempotent re-join; membership is unchanged.
    AlreadyPresent,
    /// The batch reached the size limit first. Retryable with a fresh
    /// snapshot and a fresh decision.
    Full,
}

/// Injected batch-document capability.
pub trait BatchStore: Send + Sync {
    /// Snapshots of all batches of an event, in ascending number order.
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn batches_for(&self, event: EventId) -> StoreResult<Vec<BatchSnapshot>>;

    /// ## Summary
    /// Atomically adds `user` to the batch unless that would push its size
    /// past `member_limit`. Creates the batch when `batch_number` is the
    /// next dense number for the event.
    ///
    /// ## Errors
    /// Returns `StoreError::Conflict` when `batch_number` would leave a gap
    /// in the numbering (the snapshot behind the decision went stale).
    fn add_member_if_within(
        &self,
        event: EventId,
        batch_number: u32,
        user: UserId,
        member_limit: u32,
    ) -> StoreResult<AddMemberOutcome>;

    /// Removes `user` from a batch; the batch keeps its number even when
    /// it becomes empty. Returns whether membership changed.
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn remove_member(
        &self,
        event: EventId,
        batch_number: u32,
        user: UserId,
    ) -> StoreResult<bool>;

    /// Discards all batches of an event (event deletion).
    ///
    /// ## Errors
    /// Returns a storage error if the backing medium fails.
    fn delete_event_batches(&self, event: EventId) -> StoreResult<()>;
}

/// In-memory batch store.
#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    batches: Mutex<HashMap<EventId, BTreeMap<u32, BTreeSet<UserId>>>>,
}

impl MemoryBatchStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn batches(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<EventId, BTreeMap<u32, BTreeSet<UserId>>>> {
        self.batches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl BatchStore for MemoryBatchStore {
    fn batches_for(&self, event: EventId) -> StoreResult<Vec<BatchSnapshot>> {
        let guard = self.batches();
        let Some(event_batches) = guard.get(&event) else {
            return Ok(Vec::new());
        };
        Ok(event_batches
            .iter()
            .map(|(batch_number, participants)| BatchSnapshot {
                batch_number: *batch_number,
                participants: participants.clone(),
            })
            .collect())
    }

    fn add_member_if_within(
        &self,
        event: EventId,
        batch_number: u32,
        user: UserId,
        member_limit: u32,
    ) -> StoreResult<AddMemberOutcome> {
        let mut guard = self.batches();
        let event_batches = guard.entry(event).or_default();

        if !event_batches.contains_key(&batch_number) {
            let next_dense = event_batches
                .keys()
                .next_back()
                .map_or(1, |highest| highest + 1);
            if batch_number != next_dense {
                return Err(StoreError::Conflict(format!(
                    "batch {batch_number} would leave a numbering gap (next is {next_dense})"
                )));
            }
            event_batches.insert(batch_number, BTreeSet::new());
            tracing::debug!(%event, batch_number, "created batch");
        }

        let participants = event_batches
            .get_mut(&batch_number)
            .ok_or(StoreError::InvariantViolation("batch vanished under lock"))?;

        if participants.contains(&user) {
            return Ok(AddMemberOutcome::AlreadyPresent);
        }
        let size = u32::try_from(participants.len()).unwrap_or(u32::MAX);
        if size >= member_limit {
            return Ok(AddMemberOutcome::Full);
        }

        participants.insert(user);
        Ok(AddMemberOutcome::Added)
    }

    fn remove_member(
        &self,
        event: EventId,
        batch_number: u32,
        user: UserId,
    ) -> StoreResult<bool> {
        let mut guard = self.batches();
        let Some(event_batches) = guard.get_mut(&event) else {
            return Ok(false);
        };
        let Some(participants) = event_batches.get_mut(&batch_number) else {
            return Ok(false);
        };
        Ok(participants.remove(&user))
    }

    fn delete_event_batches(&self, event: EventId) -> StoreResult<()> {
        self.batches().remove(&event);
        Ok(())
    }
}
