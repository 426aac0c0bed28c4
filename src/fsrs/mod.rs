// src/fsrs/mod.rs
// The memory model: forgetting-curve math shared by the scheduler and the
// parameter optimizer.

pub mod optimizer;
pub mod params;

use serde::{Deserialize, Serialize};

use crate::error::{MemodeckError, Result};
use params::ParameterVector;

/// Number of weights the model expects in a parameter vector.
pub const WEIGHT_COUNT: usize = 17;

/// Forgetting-curve factor: retrievability halves when elapsed time reaches
/// 9 * stability.
const FACTOR: f64 = 9.0;

/// Stability never drops below this, which also keeps the retrievability
/// denominator away from zero.
const STABILITY_FLOOR: f64 = 0.01;

const DIFFICULTY_MIN: f64 = 1.0;
const DIFFICULTY_MAX: f64 = 10.0;

/// Success intervals are whole days with a one-day floor.
pub const MIN_INTERVAL_DAYS: f64 = 1.0;

/// Lapsed cards come back the same day: ten minutes, expressed in days.
pub const RELEARN_STEP_DAYS: f64 = 10.0 / (24.0 * 60.0);

const MAX_INTERVAL_DAYS: f64 = 36_500.0;

/// The user's answer quality for a single review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Again = 1,
    Hard = 2,
    Good = 3,
    Easy = 4,
}

impl Rating {
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    pub fn from_value(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Rating::Again),
            2 => Ok(Rating::Hard),
            3 => Ok(Rating::Good),
            4 => Ok(Rating::Easy),
            other => Err(MemodeckError::InvalidRating(other)),
        }
    }

    pub fn value(self) -> u32 {
        self as u32
    }

    /// A review counts as remembered unless the card was rated Again.
    pub fn is_success(self) -> bool {
        self != Rating::Again
    }
}

/// Per-card memory state: stability in days, difficulty on a 1-10 scale.
/// `None` on a card means it has never been reviewed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryState {
    pub stability: f64,
    pub difficulty: f64,
}

/// Predicted next interval (in days) for each possible rating.
/// Ephemeral; computed for display before the user commits a rating.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NextIntervalPreview {
    pub again: f64,
    pub hard: f64,
    pub good: f64,
    pub easy: f64,
}

/// Probability of successful recall after `elapsed_days` at the given
/// stability. Power-law curve: R = (1 + t / (9 s))^-1.
pub fn retrievability(stability: f64, elapsed_days: f64) -> f64 {
    let s = stability.max(STABILITY_FLOOR);
    let t = elapsed_days.max(0.0);
    1.0 / (1.0 + t / (FACTOR * s))
}

/// Pure function library over one fixed weight vector. Construct a fresh
/// model from the current parameter snapshot per operation; it is cheap.
#[derive(Debug, Clone)]
pub struct MemoryModel {
    w: [f64; WEIGHT_COUNT],
}

impl MemoryModel {
    pub fn new(params: &ParameterVector) -> Result<Self> {
        if params.weights.len() != WEIGHT_COUNT {
            return Err(MemodeckError::InvalidParameterVector {
                expected: WEIGHT_COUNT,
                got: params.weights.len(),
            });
        }
        let mut w = [0.0; WEIGHT_COUNT];
        w.copy_from_slice(&params.weights);
        Ok(MemoryModel { w })
    }

    pub(crate) fn from_weights(w: [f64; WEIGHT_COUNT]) -> Self {
        MemoryModel { w }
    }

    /// State after a New card's first rating. Initial stability is a direct
    /// lookup keyed by rating; initial difficulty is linear in the rating.
    pub fn initial_state(&self, rating: Rating) -> MemoryState {
        let w = &self.w;
        let stability = w[(rating.value() - 1) as usize].max(STABILITY_FLOOR);
        let difficulty =
            (w[4] - (rating.value() as f64 - 3.0) * w[5]).clamp(DIFFICULTY_MIN, DIFFICULTY_MAX);
        MemoryState {
            stability,
            difficulty,
        }
    }

    /// State after reviewing a card that already has memory state.
    pub fn next_state(&self, state: MemoryState, elapsed_days: f64, rating: Rating) -> MemoryState {
        let r = retrievability(state.stability, elapsed_days);
        let difficulty = self.next_difficulty(state.difficulty, rating);
        let stability = if rating == Rating::Again {
            self.forget_stability(state.difficulty, state.stability, r)
        } else {
            self.recall_stability(state.difficulty, state.stability, r, rating)
        };
        MemoryState {
            stability,
            difficulty,
        }
    }

    /// Elapsed time at which retrievability decays to `desired_retention`,
    /// in fractional days. Unrounded; see `interval_for` for the
    /// rating-aware granularity rules.
    pub fn next_interval(&self, stability: f64, desired_retention: f64) -> f64 {
        let r = desired_retention.clamp(0.0001, 0.9999);
        let s = stability.max(STABILITY_FLOOR);
        (FACTOR * s * (1.0 / r - 1.0)).min(MAX_INTERVAL_DAYS)
    }

    /// Interval with display granularity applied: success ratings schedule
    /// whole days (>= 1); Again always schedules the sub-day relearn step,
    /// whatever the post-lapse stability, so the card re-enters the
    /// same-day relearning loop.
    pub fn interval_for(&self, rating: Rating, stability: f64, desired_retention: f64) -> f64 {
        match rating {
            Rating::Again => RELEARN_STEP_DAYS,
            _ => self
                .next_interval(stability, desired_retention)
                .round()
                .max(MIN_INTERVAL_DAYS),
        }
    }

    /// Candidate intervals for all four ratings. Pure: mutates nothing and
    /// may be called repeatedly while the card is on screen.
    pub fn preview_all_ratings(
        &self,
        state: Option<MemoryState>,
        elapsed_days: f64,
        desired_retention: f64,
    ) -> NextIntervalPreview {
        let mut days = [0.0; 4];
        for (slot, rating) in days.iter_mut().zip(Rating::ALL) {
            let next = match state {
                Some(current) => self.next_state(current, elapsed_days, rating),
                None => self.initial_state(rating),
            };
            *slot = self.interval_for(rating, next.stability, desired_retention);
        }
        NextIntervalPreview {
            again: days[0],
            hard: days[1],
            good: days[2],
            easy: days[3],
        }
    }

    fn next_difficulty(&self, difficulty: f64, rating: Rating) -> f64 {
        let w = &self.w;
        let shifted = difficulty - (rating.value() as f64 - 3.0) * w[6];
        // Mean reversion toward the base difficulty keeps repeated extreme
        // ratings from pinning the value at a bound.
        let reverted = w[7] * w[4] + (1.0 - w[7]) * shifted;
        reverted.clamp(DIFFICULTY_MIN, DIFFICULTY_MAX)
    }

    fn recall_stability(&self, difficulty: f64, stability: f64, r: f64, rating: Rating) -> f64 {
        let w = &self.w;
        let hard_penalty = if rating == Rating::Hard { w[15] } else { 1.0 };
        let easy_bonus = if rating == Rating::Easy { w[16] } else { 1.0 };
        let growth = w[8].exp()
            * (11.0 - difficulty)
            * stability.max(STABILITY_FLOOR).powf(-w[9])
            * ((1.0 - r) * w[10]).exp_m1()
            * hard_penalty
            * easy_bonus;
        (stability * (1.0 + growth)).max(STABILITY_FLOOR)
    }

    fn forget_stability(&self, difficulty: f64, stability: f64, r: f64) -> f64 {
        let w = &self.w;
        let s = w[11]
            * difficulty.max(DIFFICULTY_MIN).powf(-w[12])
            * ((stability + 1.0).powf(w[13]) - 1.0)
            * ((1.0 - r) * w[14]).exp();
        // A lapse never leaves the card more stable than it was.
        s.clamp(STABILITY_FLOOR, stability.max(STABILITY_FLOOR))
    }
}
