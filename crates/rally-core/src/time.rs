//! Session-day time utilities.
//!
//! The usage budget is accounted per "session day": the viewer-local
//! calendar day relative to a fixed reset time-of-day, not midnight. An
//! instant before today's reset time still belongs to the prior day's
//! session.

use chrono::{DateTime, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use crate::constants::BUDGET_KEY_PREFIX;

/// ## Summary
/// Computes the session-day key for `now`.
///
/// The key is the local calendar day, shifted back by one day while the
/// local time-of-day is before the daily reset boundary.
#[must_use]
pub fn session_day_key(now: DateTime<Utc>, tz: Tz, reset: NaiveTime) -> NaiveDate {
    let local = now.with_timezone(&tz);
    let local_day = local.date_naive();
    if local.time() < reset {
        // pred_opt only fails at the representable-date limits
        local_day.pred_opt().unwrap_or(local_day)
    } else {
        local_day
    }
}

/// Storage key for the persisted budget counter of one session day.
#[must_use]
pub fn budget_key(day: NaiveDate) -> String {
    format!("{BUDGET_KEY_PREFIX}{day}")
}

/// ## Summary
/// Returns the first reset boundary strictly after `now` as a UTC instant.
///
/// The boundary is the reset time-of-day on the calendar day following the
/// current session day. Ambiguous local times (DST fold) resolve to the
/// earlier instant; non-existent local times (DST gap) slide forward an
/// hour until a valid instant is found.
#[must_use]
pub fn next_reset_instant(now: DateTime<Utc>, tz: Tz, reset: NaiveTime) -> DateTime<Utc> {
    let day = session_day_key(now, tz, reset);
    let boundary_day = day.succ_opt().unwrap_or(day);
    resolve_local(tz, boundary_day.and_time(reset))
}

fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = naive;
    for _ in 0..3 {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += TimeDelta::hours(1),
        }
    }
    // No real zone has a gap this wide; interpret the wall time as UTC.
    Utc.from_utc_datetime(&naive)
}
