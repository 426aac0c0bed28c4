// src/config.rs

use std::path::PathBuf;

use crate::fsrs::optimizer::OptimizerConfig;

pub struct Config {
    /// SQLite collection file.
    pub db_path: PathBuf,
    /// Optional JSON file the model parameters are loaded from and saved
    /// to after training. None keeps parameters in memory only.
    pub params_path: Option<PathBuf>,
    /// Target recall probability at the scheduled review; [0.6, 1.0].
    pub desired_retention: f64,
    /// Cards fetched per due batch during a study session.
    pub batch_size: usize,
    pub optimizer: OptimizerConfig,
}

impl Config {
    pub fn new(db_path: PathBuf) -> Self {
        Self {
            db_path,
            params_path: None,
            desired_retention: 0.9,
            batch_size: 20,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::new(PathBuf::from("memodeck.db"))
    }
}
