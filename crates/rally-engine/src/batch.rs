//! Batch assignment decisions.
//!
//! A batch is a capacity-bounded sub-group of participants. Joining scans
//! batches in number order for a free seat; when every batch is full, a
//! small trailing group is folded into the highest-numbered batch instead
//! of being stranded alone, bounded by the overflow threshold. The decision
//! is pure; persisting the membership change is the caller's job, through
//! the store's atomic conditional add-member.

use std::collections::BTreeSet;

use rally_core::types::UserId;
use serde::{Deserialize, Serialize};

/// Point-in-time view of one batch.
///
/// Batch numbers are dense from 1 in creation order. A batch may become
/// empty but still counts for numbering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSnapshot {
    pub batch_number: u32,
    pub participants: BTreeSet<UserId>,
}

impl BatchSnapshot {
    #[must_use]
    pub fn new(batch_number: u32) -> Self {
        Self {
            batch_number,
            participants: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        u32::try_from(self.participants.len()).unwrap_or(u32::MAX)
    }
}

/// Why a joiner was routed where they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Re-join; the participant is already in this batch. No-op.
    AlreadyMember,
    /// A batch below capacity had a seat.
    OpenSeat,
    /// Every batch was full; routed into the trailing batch to avoid
    /// isolating a small group.
    Overflow,
    /// A new batch is opened with this number.
    NewBatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinDecision {
    pub batch_number: u32,
    pub kind: JoinKind,
}

impl JoinDecision {
    /// Size the target batch may grow to when persisting this decision.
    /// The overflow target may exceed nominal capacity by the threshold.
    #[must_use]
    pub fn member_limit(&self, capacity: u32, overflow_threshold: u32) -> u32 {
        match self.kind {
            JoinKind::Overflow => capacity.saturating_add(overflow_threshold),
            _ => capacity,
        }
    }
}

/// ## Summary
/// True when "full" batches may still accept a joiner: every existing batch
/// is at or above capacity, and the trailing batch has absorbed fewer than
/// `overflow_threshold` extras. Opening a new batch in this state would
/// strand a group of at most `overflow_threshold` people.
///
/// The background reassignment job consults the same predicate, so the
/// asynchronous flag and the synchronous join decision always agree.
#[must_use]
pub fn overflow_eligible(
    batches: &[BatchSnapshot],
    capacity: u32,
    overflow_threshold: u32,
) -> bool {
    let Some(newest) = batches.iter().max_by_key(|batch| batch.batch_number) else {
        return false;
    };
    let all_full = batches.iter().all(|batch| batch.size() >= capacity);
    all_full && newest.size() < capacity.saturating_add(overflow_threshold)
}

/// ## Summary
/// Decides which batch a joining participant lands in.
///
/// Scans batches in ascending number order for the first with a free seat;
/// re-joins are idempotent and report the existing batch. With no seat
/// free, overflow into the trailing batch applies while
/// [`overflow_eligible`] holds; otherwise a new batch numbered one past the
/// current maximum (or 1) is opened.
#[must_use]
pub fn choose_batch_for_join(
    batches: &[BatchSnapshot],
    user: UserId,
    capacity: u32,
    overflow_threshold: u32,
) -> JoinDecision {
    let mut ordered: Vec<&BatchSnapshot> = batches.iter().collect();
    ordered.sort_by_key(|batch| batch.batch_number);

    for batch in &ordered {
        if batch.participants.contains(&user) {
            return JoinDecision {
                batch_number: batch.batch_number,
                kind: JoinKind::AlreadyMember,
            };
        }
    }

    for batch in &ordered {
        if batch.size() < capacity {
            return JoinDecision {
                batch_number: batch.batch_number,
                kind: JoinKind::OpenSeat,
            };
        }
    }

    if overflow_eligible(batches, capacity, overflow_threshold) {
        let newest = ordered
            .last()
            .map_or(1, |batch| batch.batch_number);
        return JoinDecision {
            batch_number: newest,
            kind: JoinKind::Overflow,
        };
    }

    let next_number = ordered.last().map_or(1, |batch| batch.batch_number + 1);
    JoinDecision {
        batch_number: next_number,
        kind: JoinKind::NewBatch,
    }
}
