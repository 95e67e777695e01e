//! Phase clock for a single occurrence.
//!
//! States run `arrival -> practice -> close -> ended`; `ended` is terminal.
//! The phase at any instant is a pure function of the durations, the
//! occurrence start, and the sampled instant, so consumers can poll on a
//! fixed interval without accumulating drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::PhaseDurations;

/// Activity window within one occurrence, plus the terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Arrival,
    Practice,
    Close,
    Ended,
}

impl Phase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "arrival",
            Self::Practice => "practice",
            Self::Close => "close",
            Self::Ended => "ended",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of sampling the phase clock.
///
/// `elapsed_seconds` is negative before the occurrence starts; callers use
/// its magnitude for a "starts in ..." countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSample {
    pub phase: Phase,
    pub elapsed_seconds: i64,
}

/// ## Summary
/// Computes the phase and elapsed time at `as_of` for an occurrence that
/// started (or will start) at `occurrence_start`.
///
/// Boundaries are half-open: an elapsed time equal to a phase's cumulative
/// end belongs to the next phase, and a zero-length phase is skipped
/// instantly.
#[must_use]
pub fn phase_at(
    durations: PhaseDurations,
    occurrence_start: DateTime<Utc>,
    as_of: DateTime<Utc>,
) -> PhaseSample {
    let elapsed_seconds = as_of.signed_duration_since(occurrence_start).num_seconds();

    let arrival_end = i64::from(durations.arrival_seconds);
    let practice_end = arrival_end + i64::from(durations.practice_seconds);
    let close_end = practice_end + i64::from(durations.close_seconds);

    let phase = if elapsed_seconds < arrival_end {
        // Covers the negative pre-start countdown as well.
        Phase::Arrival
    } else if elapsed_seconds < practice_end {
        Phase::Practice
    } else if elapsed_seconds < close_end {
        Phase::Close
    } else {
        Phase::Ended
    };

    PhaseSample {
        phase,
        elapsed_seconds,
    }
}

/// Chat is open while participants gather and wind down, closed during
/// practice and after the occurrence ends. Exact product policy.
#[must_use]
pub const fn chat_enabled(phase: Phase) -> bool {
    matches!(phase, Phase::Arrival | Phase::Close)
}
