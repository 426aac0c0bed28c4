// src/fsrs/optimizer.rs
// Fits the model weights to the user's review history by gradient descent
// on log-loss. Deterministic: the same log and starting vector always
// produce the same output.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{info, warn};

use crate::error::{MemodeckError, Result};
use crate::fsrs::params::ParameterVector;
use crate::fsrs::{retrievability, MemoryModel, Rating, WEIGHT_COUNT};
use crate::storage::ReviewLogEntry;

/// Per-weight clamp bounds keep the descent inside the region where the
/// curve formulas stay well-behaved (exponents positive, penalties in
/// range).
const WEIGHT_BOUNDS: [(f64, f64); WEIGHT_COUNT] = [
    (0.01, 100.0), // w0: initial stability, Again
    (0.01, 100.0), // w1: initial stability, Hard
    (0.01, 100.0), // w2: initial stability, Good
    (0.01, 100.0), // w3: initial stability, Easy
    (1.0, 10.0),   // w4: base difficulty
    (0.01, 5.0),   // w5: initial difficulty slope
    (0.01, 5.0),   // w6: difficulty delta per rating step
    (0.0, 0.75),   // w7: mean-reversion strength
    (0.0, 4.5),    // w8: stability growth scale (log)
    (0.0, 0.8),    // w9: stability saturation exponent
    (0.01, 3.5),   // w10: retrievability gain
    (0.1, 5.0),    // w11: post-lapse stability scale
    (0.01, 0.25),  // w12: post-lapse difficulty exponent
    (0.01, 0.9),   // w13: post-lapse stability exponent
    (0.01, 4.0),   // w14: post-lapse retrievability gain
    (0.0, 1.0),    // w15: hard interval penalty
    (1.0, 6.0),    // w16: easy interval bonus
];

#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub max_iterations: usize,
    pub learning_rate: f64,
    /// Stop early once the loss change between iterations falls below this.
    pub tolerance: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            max_iterations: 100,
            learning_rate: 0.05,
            tolerance: 1e-6,
        }
    }
}

/// Best-effort cancellation for a long-running fit. Checked at iteration
/// boundaries; cancelling returns the best vector found so far.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// One card's chronological rating sequence. The first review initializes
/// state; each later review contributes a (predicted, observed) pair.
struct CardHistory {
    reviews: Vec<(Rating, f64)>,
}

fn histories(log: &[ReviewLogEntry]) -> Vec<CardHistory> {
    let mut by_card: BTreeMap<i64, Vec<&ReviewLogEntry>> = BTreeMap::new();
    for entry in log {
        by_card.entry(entry.card_id).or_default().push(entry);
    }
    by_card
        .into_values()
        .map(|mut entries| {
            entries.sort_by(|a, b| a.reviewed_at.cmp(&b.reviewed_at));
            CardHistory {
                reviews: entries
                    .iter()
                    .map(|e| (e.rating, e.elapsed_days.max(0.0)))
                    .collect(),
            }
        })
        .filter(|h| h.reviews.len() >= 2)
        .collect()
}

/// Mean log-loss of the candidate weights over all predicted reviews.
fn mean_log_loss(weights: &[f64; WEIGHT_COUNT], histories: &[CardHistory]) -> f64 {
    let model = MemoryModel::from_weights(*weights);
    let mut loss = 0.0;
    let mut predictions = 0usize;
    for history in histories {
        let (first_rating, _) = history.reviews[0];
        let mut state = model.initial_state(first_rating);
        for &(rating, elapsed_days) in &history.reviews[1..] {
            let predicted =
                retrievability(state.stability, elapsed_days).clamp(1e-6, 1.0 - 1e-6);
            loss += if rating.is_success() {
                -predicted.ln()
            } else {
                -(1.0 - predicted).ln()
            };
            predictions += 1;
            state = model.next_state(state, elapsed_days, rating);
        }
    }
    loss / predictions as f64
}

/// Fits a new parameter vector against the review log, starting from
/// `initial`. A starting vector with the wrong weight count is rejected;
/// an empty (or too-thin) log returns `initial` unchanged.
/// `desired_retention` always passes through untouched.
pub fn fit(
    log: &[ReviewLogEntry],
    initial: &ParameterVector,
    config: &OptimizerConfig,
    cancel: Option<&CancelToken>,
) -> Result<ParameterVector> {
    if initial.weights.len() != WEIGHT_COUNT {
        return Err(MemodeckError::InvalidParameterVector {
            expected: WEIGHT_COUNT,
            got: initial.weights.len(),
        });
    }
    let histories = histories(log);
    if histories.is_empty() {
        return Ok(initial.clone());
    }

    let mut weights = [0.0; WEIGHT_COUNT];
    weights.copy_from_slice(&initial.weights);

    let mut best_weights = weights;
    let mut best_loss = mean_log_loss(&weights, &histories);
    let mut previous_loss = best_loss;
    let mut converged = false;
    info!(
        "fitting {} weights against {} card histories (initial loss {:.5})",
        WEIGHT_COUNT,
        histories.len(),
        best_loss
    );

    for iteration in 0..config.max_iterations {
        if cancel.map_or(false, CancelToken::is_cancelled) {
            info!("fit cancelled at iteration {iteration}");
            break;
        }

        // Central-difference gradient, one weight at a time.
        let mut gradient = [0.0; WEIGHT_COUNT];
        for i in 0..WEIGHT_COUNT {
            let eps = 1e-4 * weights[i].abs().max(0.01);
            let mut up = weights;
            let mut down = weights;
            up[i] += eps;
            down[i] -= eps;
            gradient[i] =
                (mean_log_loss(&up, &histories) - mean_log_loss(&down, &histories)) / (2.0 * eps);
        }

        for i in 0..WEIGHT_COUNT {
            let (lo, hi) = WEIGHT_BOUNDS[i];
            weights[i] = (weights[i] - config.learning_rate * gradient[i]).clamp(lo, hi);
        }

        let loss = mean_log_loss(&weights, &histories);
        if loss < best_loss {
            best_loss = loss;
            best_weights = weights;
        }
        if (previous_loss - loss).abs() < config.tolerance {
            info!("fit converged after {} iterations (loss {:.5})", iteration + 1, loss);
            converged = true;
            break;
        }
        previous_loss = loss;
    }

    if !converged {
        // Not a failure: the best vector found within the budget still wins.
        warn!(
            "fit stopped without convergence; keeping best loss {:.5}",
            best_loss
        );
    }

    Ok(ParameterVector {
        weights: best_weights.to_vec(),
        desired_retention: initial.desired_retention,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn entry(card_id: i64, day: i64, rating: Rating, elapsed_days: f64) -> ReviewLogEntry {
        ReviewLogEntry {
            card_id,
            reviewed_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
                + Duration::days(day),
            rating,
            stability_before: None,
            difficulty_before: None,
            elapsed_days,
        }
    }

    /// A mix of cards that survive long gaps and cards that lapse quickly.
    fn synthetic_log() -> Vec<ReviewLogEntry> {
        let mut log = Vec::new();
        for card in 0..6_i64 {
            log.push(entry(card, 0, Rating::Good, 0.0));
            log.push(entry(card, 3, Rating::Good, 3.0));
            log.push(entry(card, 10, Rating::Good, 7.0));
        }
        for card in 6..10_i64 {
            log.push(entry(card, 0, Rating::Good, 0.0));
            log.push(entry(card, 2, Rating::Again, 2.0));
            log.push(entry(card, 3, Rating::Hard, 1.0));
        }
        log
    }

    #[test]
    fn test_empty_log_is_identity() {
        let initial = ParameterVector::default();
        let fitted = fit(&[], &initial, &OptimizerConfig::default(), None).unwrap();
        assert_eq!(fitted, initial);
    }

    #[test]
    fn test_single_review_cards_are_identity() {
        // One review per card gives nothing to predict.
        let log = vec![
            entry(1, 0, Rating::Good, 0.0),
            entry(2, 0, Rating::Easy, 0.0),
        ];
        let initial = ParameterVector::default();
        let fitted = fit(&log, &initial, &OptimizerConfig::default(), None).unwrap();
        assert_eq!(fitted, initial);
    }

    #[test]
    fn test_malformed_initial_vector_rejected() {
        let initial = ParameterVector {
            weights: vec![0.5; 12],
            desired_retention: 0.9,
        };
        assert!(matches!(
            fit(&synthetic_log(), &initial, &OptimizerConfig::default(), None),
            Err(MemodeckError::InvalidParameterVector {
                expected: WEIGHT_COUNT,
                got: 12
            })
        ));
        assert!(matches!(
            fit(&[], &initial, &OptimizerConfig::default(), None),
            Err(MemodeckError::InvalidParameterVector { .. })
        ));
    }

    #[test]
    fn test_fit_is_deterministic() {
        let log = synthetic_log();
        let initial = ParameterVector::default();
        let config = OptimizerConfig {
            max_iterations: 10,
            ..OptimizerConfig::default()
        };
        let a = fit(&log, &initial, &config, None).unwrap();
        let b = fit(&log, &initial, &config, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fit_does_not_worsen_loss() {
        let log = synthetic_log();
        let initial = ParameterVector::default();
        let config = OptimizerConfig {
            max_iterations: 25,
            ..OptimizerConfig::default()
        };
        let fitted = fit(&log, &initial, &config, None).unwrap();

        let hist = histories(&log);
        let mut w0 = [0.0; WEIGHT_COUNT];
        w0.copy_from_slice(&initial.weights);
        let mut w1 = [0.0; WEIGHT_COUNT];
        w1.copy_from_slice(&fitted.weights);
        assert!(mean_log_loss(&w1, &hist) <= mean_log_loss(&w0, &hist) + 1e-12);
        assert_eq!(fitted.desired_retention, initial.desired_retention);
    }

    #[test]
    fn test_cancelled_fit_returns_valid_vector() {
        let log = synthetic_log();
        let token = CancelToken::new();
        token.cancel();
        let fitted = fit(
            &log,
            &ParameterVector::default(),
            &OptimizerConfig::default(),
            Some(&token),
        )
        .unwrap();
        assert!(fitted.validate().is_ok());
    }
}
