//! Event definitions and derived occurrences.

use chrono::{DateTime, TimeDelta, Utc};
use rally_core::types::{EventId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::recurrence::RecurrenceRule;

/// Durations of the three sequential activity windows of one occurrence,
/// in seconds. Zero-length phases are legal and are skipped instantly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDurations {
    pub arrival_seconds: u32,
    pub practice_seconds: u32,
    pub close_seconds: u32,
}

impl PhaseDurations {
    #[must_use]
    pub fn total_seconds(self) -> u64 {
        u64::from(self.arrival_seconds)
            + u64::from(self.practice_seconds)
            + u64::from(self.close_seconds)
    }

    #[must_use]
    pub fn total(self) -> TimeDelta {
        TimeDelta::seconds(
            i64::from(self.arrival_seconds)
                + i64::from(self.practice_seconds)
                + i64::from(self.close_seconds),
        )
    }
}

/// An event as configured by its organizer.
///
/// Immutable value; edits go through the event service, which enforces the
/// same-organizer and not-currently-live rules and replaces the record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub id: EventId,
    /// First occurrence anchor.
    pub start: DateTime<Utc>,
    pub durations: PhaseDurations,
    pub recurrence: RecurrenceRule,
    pub capacity_per_batch: u32,
    pub created_by: UserId,
}

impl EventDefinition {
    /// ## Summary
    /// Validates the definition before it reaches the evaluator or stores.
    ///
    /// ## Errors
    /// Returns `EngineError::ValidationError` for a zero batch capacity or
    /// an ill-formed recurrence rule.
    pub fn validate(&self) -> EngineResult<()> {
        if self.capacity_per_batch == 0 {
            return Err(EngineError::ValidationError(
                "capacity_per_batch must be at least 1".to_string(),
            ));
        }
        self.recurrence.validate()
    }
}

/// One concrete instance in time of a possibly-recurring event.
///
/// Derived on demand, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Occurrence {
    #[must_use]
    pub fn from_start(start: DateTime<Utc>, durations: PhaseDurations) -> Self {
        Self {
            start,
            end: start + durations.total(),
        }
    }

    /// True while `at` falls inside this occurrence, boundaries included.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}
