//! Recurrence rules and occurrence evaluation.
//!
//! `next_occurrence` steps a rule forward from the event's anchor until it
//! finds the first occurrence whose end is strictly after the `as_of`
//! instant: the occurrence currently in progress, or the next one to start,
//! never one already fully elapsed. All arithmetic is on UTC instants with
//! the anchor's time-of-day preserved.

use std::collections::BTreeSet;

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::event::{EventDefinition, Occurrence};

/// Upper bound on stepping iterations per evaluation.
///
/// A rule that fails to advance (or a pathological zero-length event far in
/// the past) must surface as "no next occurrence" instead of hanging.
pub const MAX_RULE_STEPS: usize = 1000;

/// Months probed for a matching ordinal weekday within a single step.
const MAX_MONTH_PROBES: u32 = 48;

/// How an event repeats. Weekday numbering is 0 = Sunday throughout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecurrenceRule {
    /// A single occurrence; the event is permanently finished once it ends.
    None,
    Daily {
        interval_days: u32,
    },
    /// Advances by whole weeks from the anchor day. `days_of_week` is
    /// carried for display but stepping does not enumerate individual
    /// weekday slots within the week.
    Weekly {
        interval_weeks: u32,
        days_of_week: BTreeSet<u8>,
    },
    /// A day-of-month past the target month's length clamps to its last day.
    MonthlyByDate {
        interval_months: u32,
        day_of_month: u8,
    },
    /// The `ordinal`-th `weekday` of the month, or the last when `ordinal`
    /// is -1. Months without the requested ordinal are skipped, never
    /// clamped.
    MonthlyByWeekday {
        interval_months: u32,
        ordinal: i8,
        weekday: u8,
    },
}

impl RecurrenceRule {
    #[must_use]
    pub const fn is_recurring(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// ## Summary
    /// Rejects ill-formed rules before they can reach the evaluator.
    ///
    /// ## Errors
    /// Returns `EngineError::ValidationError` naming the offending field.
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Self::None => Ok(()),
            Self::Daily { interval_days } => {
                validate_interval(*interval_days, "interval_days")
            }
            Self::Weekly {
                interval_weeks,
                days_of_week,
            } => {
                validate_interval(*interval_weeks, "interval_weeks")?;
                if days_of_week.is_empty() {
                    return Err(EngineError::ValidationError(
                        "days_of_week must not be empty".to_string(),
                    ));
                }
                for day in days_of_week {
                    validate_weekday(*day)?;
                }
                Ok(())
            }
            Self::MonthlyByDate {
                interval_months,
                day_of_month,
            } => {
                validate_interval(*interval_months, "interval_months")?;
                if !(1..=31).contains(day_of_month) {
                    return Err(EngineError::ValidationError(format!(
                        "day_of_month {day_of_month} is outside 1..=31"
                    )));
                }
                Ok(())
            }
            Self::MonthlyByWeekday {
                interval_months,
                ordinal,
                weekday,
            } => {
                validate_interval(*interval_months, "interval_months")?;
                if *ordinal != -1 && !(1..=4).contains(ordinal) {
                    return Err(EngineError::ValidationError(format!(
                        "ordinal {ordinal} is outside -1 | 1..=4"
                    )));
                }
                validate_weekday(*weekday)
            }
        }
    }
}

fn validate_interval(interval: u32, field: &str) -> EngineResult<()> {
    if interval == 0 {
        return Err(EngineError::ValidationError(format!(
            "{field} must be at least 1"
        )));
    }
    Ok(())
}

fn validate_weekday(weekday: u8) -> EngineResult<()> {
    if weekday > 6 {
        return Err(EngineError::ValidationError(format!(
            "weekday {weekday} is outside 0..=6"
        )));
    }
    Ok(())
}

/// ## Summary
/// Returns the first occurrence whose end is strictly after `as_of`, or
/// `None` when the event is permanently finished.
///
/// Non-recurring events yield their single occurrence while it has not
/// fully elapsed. For recurring events whose anchor is still in the future,
/// the anchor occurrence is returned directly. Otherwise the rule's step
/// function advances a working occurrence from the anchor; the stepping
/// loop is capped at [`MAX_RULE_STEPS`], and exceeding the cap is surfaced
/// as "no next occurrence" with an error-level trace rather than a hang.
///
/// Pure function of `(def, as_of)`; stable under repeated calls.
#[must_use]
pub fn next_occurrence(def: &EventDefinition, as_of: DateTime<Utc>) -> Option<Occurrence> {
    let first = Occurrence::from_start(def.start, def.durations);

    if !def.recurrence.is_recurring() {
        return (first.end > as_of).then_some(first);
    }
    if def.start > as_of {
        return Some(first);
    }

    let mut current = first;
    for _ in 0..MAX_RULE_STEPS {
        if current.end > as_of {
            return Some(current);
        }
        let Some(next_start) = step(&def.recurrence, current.start) else {
            tracing::error!(
                event = %def.id,
                rule = ?def.recurrence,
                "recurrence step failed to advance; treating as no next occurrence"
            );
            return None;
        };
        if next_start <= current.start {
            tracing::error!(
                event = %def.id,
                rule = ?def.recurrence,
                "recurrence step did not move forward; treating as no next occurrence"
            );
            return None;
        }
        current = Occurrence::from_start(next_start, def.durations);
    }

    tracing::error!(
        event = %def.id,
        steps = MAX_RULE_STEPS,
        "recurrence stepping exceeded the iteration cap"
    );
    None
}

/// True iff an occurrence is in progress at `as_of`, boundaries included.
#[must_use]
pub fn is_live(def: &EventDefinition, as_of: DateTime<Utc>) -> bool {
    next_occurrence(def, as_of).is_some_and(|occurrence| occurrence.contains(as_of))
}

/// Advances one occurrence start to the next per the rule.
fn step(rule: &RecurrenceRule, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match rule {
        RecurrenceRule::None => None,
        RecurrenceRule::Daily { interval_days } => {
            start.checked_add_days(Days::new(u64::from(*interval_days)))
        }
        RecurrenceRule::Weekly { interval_weeks, .. } => {
            start.checked_add_days(Days::new(u64::from(*interval_weeks) * 7))
        }
        RecurrenceRule::MonthlyByDate {
            interval_months,
            day_of_month,
        } => {
            let anchor = start
                .date_naive()
                .with_day(1)?
                .checked_add_months(Months::new(*interval_months))?;
            let day = u32::from(*day_of_month).min(days_in_month(anchor)?);
            let date = anchor.with_day(day)?;
            at_same_time(date, start)
        }
        RecurrenceRule::MonthlyByWeekday {
            interval_months,
            ordinal,
            weekday,
        } => {
            let mut month_first = start.date_naive().with_day(1)?;
            // The current month's ordinal weekday counts while it is still
            // ahead; this aligns an off-pattern anchor onto the series.
            if let Some(date) = nth_weekday_of_month(month_first, *weekday, *ordinal) {
                let candidate = at_same_time(date, start)?;
                if candidate > start {
                    return Some(candidate);
                }
            }
            for _ in 0..MAX_MONTH_PROBES {
                month_first = month_first.checked_add_months(Months::new(*interval_months))?;
                if let Some(date) = nth_weekday_of_month(month_first, *weekday, *ordinal) {
                    return at_same_time(date, start);
                }
            }
            None
        }
    }
}

fn at_same_time(date: NaiveDate, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::new(date, start.time());
    Some(Utc.from_utc_datetime(&naive))
}

/// Number of days in the month containing `date`.
fn days_in_month(date: NaiveDate) -> Option<u32> {
    let first = date.with_day(1)?;
    let next = first.checked_add_months(Months::new(1))?;
    u32::try_from(next.signed_duration_since(first).num_days()).ok()
}

/// The `ordinal`-th occurrence of `weekday` (0 = Sunday) in the month of
/// `first_of_month`, or the last occurrence when `ordinal` is -1. `None`
/// when the month has no such ordinal.
fn nth_weekday_of_month(first_of_month: NaiveDate, weekday: u8, ordinal: i8) -> Option<NaiveDate> {
    let length = days_in_month(first_of_month)?;
    let first_dow = first_of_month.weekday().num_days_from_sunday();
    let offset = (u32::from(weekday) + 7 - first_dow) % 7;

    if ordinal == -1 {
        let mut day = 1 + offset;
        while day + 7 <= length {
            day += 7;
        }
        return first_of_month.with_day(day);
    }

    let nth = u32::try_from(ordinal).ok()?;
    let day = 1 + offset + 7 * (nth.checked_sub(1)?);
    if day > length {
        return None;
    }
    first_of_month.with_day(day)
}
