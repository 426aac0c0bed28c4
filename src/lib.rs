// src/lib.rs
// memodeck: a spaced-repetition scheduling and card-state engine.
//
// The core loop: DeckAggregator picks what is due, CardScheduler serves
// cards and applies ratings through the FSRS-style MemoryModel, every
// rating lands in the append-only review log, and the Optimizer refits
// the model weights against that log on demand.

pub mod api;
pub mod config;
pub mod deck;
pub mod error;
pub mod fsrs;
pub mod scheduler;
pub mod session;
pub mod storage;

pub use api::Engine;
pub use config::Config;
pub use deck::aggregator::DeckAggregator;
pub use deck::template::{parse_content, CardContent, TemplateKind};
pub use deck::{Card, Deck, DeckSummary, Template};
pub use error::{MemodeckError, Result};
pub use fsrs::optimizer::{CancelToken, OptimizerConfig};
pub use fsrs::params::{ParameterStore, ParameterVector};
pub use fsrs::{MemoryModel, MemoryState, NextIntervalPreview, Rating};
pub use scheduler::{classify, CardPhase, CardScheduler};
pub use session::StudySession;
pub use storage::{ReviewLogEntry, Storage};
