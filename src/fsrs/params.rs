// src/fsrs/params.rs
// Parameter vector and the shared store the scheduler reads from.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{MemodeckError, Result};
use crate::fsrs::WEIGHT_COUNT;

pub const RETENTION_MIN: f64 = 0.6;
pub const RETENTION_MAX: f64 = 1.0;

const DEFAULT_RETENTION: f64 = 0.9;

/// Published FSRS-4.5 defaults; a reasonable curve before any history
/// exists to fit against.
pub const DEFAULT_WEIGHTS: [f64; WEIGHT_COUNT] = [
    0.4, 0.6, 2.4, 5.8, // w0-w3: initial stability per first rating
    4.93, 0.94, 0.86, 0.01, 1.49, // w4-w8: difficulty and growth scale
    0.14, 0.94, 2.18, 0.05, 0.34, // w9-w13
    1.26, 0.29, 2.61, // w14-w16: lapse decay, hard penalty, easy bonus
];

/// The full set of numbers governing the memory model's curve shape, plus
/// the user's target recall probability. Replaced wholesale; never mutated
/// in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    pub weights: Vec<f64>,
    pub desired_retention: f64,
}

impl Default for ParameterVector {
    fn default() -> Self {
        ParameterVector {
            weights: DEFAULT_WEIGHTS.to_vec(),
            desired_retention: DEFAULT_RETENTION,
        }
    }
}

impl ParameterVector {
    pub fn validate(&self) -> Result<()> {
        if self.weights.len() != WEIGHT_COUNT {
            return Err(MemodeckError::InvalidParameterVector {
                expected: WEIGHT_COUNT,
                got: self.weights.len(),
            });
        }
        check_retention(self.desired_retention)?;
        Ok(())
    }
}

fn check_retention(retention: f64) -> Result<()> {
    if !(RETENTION_MIN..=RETENTION_MAX).contains(&retention) || !retention.is_finite() {
        return Err(MemodeckError::RetentionOutOfRange(retention));
    }
    Ok(())
}

/// Read-many / write-rare holder for the current parameter vector.
/// Readers take a cloned snapshot; the optimizer swaps in a whole new
/// vector when it finishes, so no reader ever sees a half-updated set of
/// weights.
pub struct ParameterStore {
    current: Mutex<ParameterVector>,
    training: Arc<AtomicBool>,
}

impl ParameterStore {
    pub fn new(params: ParameterVector) -> Result<Self> {
        params.validate()?;
        Ok(ParameterStore {
            current: Mutex::new(params),
            training: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Loads a parameter file if one exists, otherwise falls back to model
    /// defaults with the given retention target.
    pub fn load_or_default(path: Option<&Path>, desired_retention: f64) -> Result<Self> {
        check_retention(desired_retention)?;
        let params = match path {
            Some(p) if p.exists() => {
                let text = fs::read_to_string(p)?;
                let params: ParameterVector = serde_json::from_str(&text)?;
                info!("loaded {} model weights from {}", params.weights.len(), p.display());
                params
            }
            _ => ParameterVector {
                desired_retention,
                ..ParameterVector::default()
            },
        };
        ParameterStore::new(params)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot();
        let text = serde_json::to_string_pretty(&snapshot)?;
        fs::write(path, text)?;
        Ok(())
    }

    pub fn snapshot(&self) -> ParameterVector {
        self.current.lock().expect("parameter store poisoned").clone()
    }

    /// Replaces the whole vector. This is the only write path.
    pub fn swap(&self, params: ParameterVector) -> Result<()> {
        params.validate()?;
        *self.current.lock().expect("parameter store poisoned") = params;
        Ok(())
    }

    pub fn desired_retention(&self) -> f64 {
        self.current
            .lock()
            .expect("parameter store poisoned")
            .desired_retention
    }

    pub fn set_desired_retention(&self, retention: f64) -> Result<()> {
        check_retention(retention)?;
        self.current
            .lock()
            .expect("parameter store poisoned")
            .desired_retention = retention;
        Ok(())
    }

    /// Claims the single optimization slot. The returned guard releases it
    /// on drop; a second caller gets `OptimizerBusy` until then.
    pub fn begin_training(&self) -> Result<TrainingGuard> {
        if self
            .training
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(MemodeckError::OptimizerBusy);
        }
        Ok(TrainingGuard {
            flag: Arc::clone(&self.training),
        })
    }
}

pub struct TrainingGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for TrainingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_bounds() {
        let store = ParameterStore::new(ParameterVector::default()).unwrap();
        store.set_desired_retention(0.6).unwrap();
        store.set_desired_retention(1.0).unwrap();
        store.set_desired_retention(0.85).unwrap();
        assert_eq!(store.desired_retention(), 0.85);
        assert!(matches!(
            store.set_desired_retention(0.5),
            Err(MemodeckError::RetentionOutOfRange(_))
        ));
        assert!(matches!(
            store.set_desired_retention(1.01),
            Err(MemodeckError::RetentionOutOfRange(_))
        ));
        // Rejected values leave the stored target untouched.
        assert_eq!(store.desired_retention(), 0.85);
    }

    #[test]
    fn test_swap_validates_length() {
        let store = ParameterStore::new(ParameterVector::default()).unwrap();
        let bad = ParameterVector {
            weights: vec![1.0; 3],
            desired_retention: 0.9,
        };
        assert!(store.swap(bad).is_err());
        assert_eq!(store.snapshot().weights.len(), WEIGHT_COUNT);
    }

    #[test]
    fn test_single_training_slot() {
        let store = ParameterStore::new(ParameterVector::default()).unwrap();
        let guard = store.begin_training().unwrap();
        assert!(matches!(
            store.begin_training(),
            Err(MemodeckError::OptimizerBusy)
        ));
        drop(guard);
        assert!(store.begin_training().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.json");
        let store = ParameterStore::new(ParameterVector::default()).unwrap();
        store.set_desired_retention(0.8).unwrap();
        store.save(&path).unwrap();

        let reloaded = ParameterStore::load_or_default(Some(&path), 0.9).unwrap();
        assert_eq!(reloaded.snapshot(), store.snapshot());
    }
}
