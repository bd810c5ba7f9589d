use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const DEFAULT_EASE_FACTOR: f64 = 2.5;
pub const DEFAULT_MAX_EASE_FACTOR: f64 = 4.0;

/// Fixed ease penalty applied on a failed review.
const FAILURE_EASE_PENALTY: f64 = 0.2;

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Upper clamp on the ease factor. `None` leaves it unbounded above.
    pub max_ease: Option<f64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_ease: Some(DEFAULT_MAX_EASE_FACTOR),
        }
    }
}

/// Spaced-repetition schedule state for one flashcard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub ease_factor: f64,
    pub interval_days: u32,
    /// Consecutive successful reviews; reset on failure.
    pub repetitions: u32,
    pub next_review_date: NaiveDate,
    pub last_review_date: Option<NaiveDate>,
    pub last_quality: Option<u8>,
}

impl ScheduleState {
    /// Fresh card: default ease, due one day out.
    pub fn new(created_on: NaiveDate) -> Self {
        Self {
            ease_factor: DEFAULT_EASE_FACTOR,
            interval_days: 1,
            repetitions: 0,
            next_review_date: created_on + Duration::days(1),
            last_review_date: None,
            last_quality: None,
        }
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        today >= self.next_review_date
    }
}

/// SM-2 schedule update. Pure: identical inputs give identical outputs.
///
/// Failure (quality < 3) resets review progress: repetitions to 0, interval
/// to 1 day, and the ease factor takes a fixed -0.2 penalty clamped at the
/// floor. Success grows the interval through the 1 / 6 / interval x ease
/// stages (integer truncation, pre-update ease) and adjusts ease with the
/// quality-delta formula.
pub fn review(
    state: &ScheduleState,
    quality: u8,
    today: NaiveDate,
    config: &SchedulerConfig,
) -> ScheduleState {
    debug_assert!(quality <= 5, "quality must be validated by the caller");

    let mut next = state.clone();
    next.last_review_date = Some(today);
    next.last_quality = Some(quality);

    if quality < 3 {
        next.repetitions = 0;
        next.interval_days = 1;
        next.ease_factor = (state.ease_factor - FAILURE_EASE_PENALTY).max(MIN_EASE_FACTOR);
    } else {
        next.interval_days = match state.repetitions {
            0 => 1,
            1 => 6,
            _ => ((state.interval_days as f64 * state.ease_factor) as u32).max(1),
        };
        next.repetitions = state.repetitions + 1;

        let q = quality as f64;
        let delta = 0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02);
        let mut ease = (state.ease_factor + delta).max(MIN_EASE_FACTOR);
        if let Some(max) = config.max_ease {
            ease = ease.min(max);
        }
        next.ease_factor = ease;
    }

    next.next_review_date = today + Duration::days(next.interval_days as i64);
    next
}
