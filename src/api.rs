// src/api.rs
// The narrow interface the presentation layer talks to. Thin facade over
// the scheduler, aggregator, optimizer, and storage.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use log::info;

use crate::config::Config;
use crate::deck::aggregator::DeckAggregator;
use crate::deck::template::TemplateKind;
use crate::deck::{Card, DeckSummary, Template};
use crate::error::Result;
use crate::fsrs::optimizer::{self, CancelToken, OptimizerConfig};
use crate::fsrs::params::ParameterStore;
use crate::fsrs::{NextIntervalPreview, Rating};
use crate::scheduler::{classify, CardPhase, CardScheduler};
use crate::session::StudySession;
use crate::storage::Storage;

pub struct Engine {
    storage: Arc<Storage>,
    params: Arc<ParameterStore>,
    scheduler: CardScheduler,
    aggregator: DeckAggregator,
    optimizer_config: OptimizerConfig,
    params_path: Option<PathBuf>,
    batch_size: usize,
}

impl Engine {
    /// Opens the collection named by the config, loading model parameters
    /// from the parameter file when one exists.
    pub fn open(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config.db_path)?);
        Engine::with_storage(storage, config)
    }

    /// Throwaway in-memory collection; used by tests and demos.
    pub fn open_in_memory(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::open_in_memory()?);
        Engine::with_storage(storage, config)
    }

    fn with_storage(storage: Arc<Storage>, config: &Config) -> Result<Self> {
        let params = Arc::new(ParameterStore::load_or_default(
            config.params_path.as_deref(),
            config.desired_retention,
        )?);
        let scheduler = CardScheduler::new(Arc::clone(&storage), Arc::clone(&params));
        let aggregator = DeckAggregator::new(Arc::clone(&storage));
        Ok(Engine {
            storage,
            params,
            scheduler,
            aggregator,
            optimizer_config: config.optimizer.clone(),
            params_path: config.params_path.clone(),
            batch_size: config.batch_size,
        })
    }

    // --- study flow ---

    pub fn get_next_card(&self, deck_id: i64, page_size: usize) -> Result<Vec<Card>> {
        self.scheduler.fetch_due_batch(deck_id, page_size, Utc::now())
    }

    pub fn load_next_state(&self, card: &Card) -> Result<NextIntervalPreview> {
        self.scheduler.preview_intervals(card, Utc::now())
    }

    /// Applies a raw rating value (1-4) to a card. Rejects anything else
    /// with `InvalidRating` before touching state.
    pub fn emit_card_review(&self, card_id: i64, rating: u32) -> Result<Card> {
        let rating = Rating::from_value(rating)?;
        self.scheduler.record_rating(card_id, rating, Utc::now())
    }

    pub fn start_session(&self, deck_id: i64) -> Result<StudySession> {
        StudySession::new(self.scheduler.clone(), deck_id, self.batch_size, Utc::now())
    }

    // --- dashboard ---

    pub fn decks_display(&self) -> Result<Vec<DeckSummary>> {
        self.aggregator.summarize_all(Utc::now())
    }

    pub fn card_count_learned_today(&self) -> Result<u32> {
        self.aggregator.count_studied_today()
    }

    // --- model parameters ---

    pub fn get_fsrs_params(&self) -> Vec<f64> {
        self.params.snapshot().weights
    }

    /// Fits the model weights against the full review log and swaps the
    /// new vector in. Only one fit may run at a time; review operations
    /// keep using the pre-fit snapshot until the swap lands.
    pub fn train_fsrs_model(&self, cancel: Option<&CancelToken>) -> Result<Vec<f64>> {
        let _guard = self.params.begin_training()?;
        // Snapshot the log first so the fit never holds the storage lock.
        let log = self.storage.reviews()?;
        let initial = self.params.snapshot();
        let fitted = optimizer::fit(&log, &initial, &self.optimizer_config, cancel)?;
        self.params.swap(fitted.clone())?;
        if let Some(path) = &self.params_path {
            self.params.save(path)?;
            info!("saved fitted parameters to {}", path.display());
        }
        Ok(fitted.weights)
    }

    pub fn get_desired_retention(&self) -> f64 {
        self.params.desired_retention()
    }

    pub fn set_desired_retention(&self, retention: f64) -> Result<()> {
        self.params.set_desired_retention(retention)
    }

    // --- deck and card CRUD ---

    pub fn add_deck(&self, name: &str) -> Result<i64> {
        self.storage.create_deck(name)
    }

    /// Deletes a deck with its cards and their review history.
    pub fn delete_deck(&self, deck_id: i64) -> Result<()> {
        self.storage.delete_deck(deck_id)
    }

    pub fn add_template(
        &self,
        deck_id: i64,
        name: &str,
        kind: TemplateKind,
        field_names: &[String],
    ) -> Result<i64> {
        self.storage.create_template(deck_id, name, kind, field_names)
    }

    pub fn get_template(&self, template_id: i64) -> Result<Template> {
        self.storage.template(template_id)
    }

    /// New cards carry no memory state and are due immediately.
    pub fn add_card(&self, deck_id: i64, template_id: i64, fields: &[String]) -> Result<i64> {
        self.storage.create_card(deck_id, template_id, fields, Utc::now())
    }

    pub fn update_card_content(&self, card_id: i64, fields: &[String]) -> Result<()> {
        self.storage.update_card_fields(card_id, fields)
    }

    /// Deletes a card; its review-log entries cascade with it.
    pub fn delete_card(&self, card_id: i64) -> Result<()> {
        self.storage.delete_card(card_id)
    }

    /// Browse query: cards matching the deck/template sets (empty set
    /// means any), restricted to the given phases, ordered by due date.
    pub fn card_filter(
        &self,
        deck_ids: &[i64],
        template_ids: &[i64],
        phases: &[CardPhase],
    ) -> Result<Vec<Card>> {
        let now = Utc::now();
        let cards = self.storage.filter_cards(deck_ids, template_ids)?;
        if phases.is_empty() {
            return Ok(cards);
        }
        Ok(cards
            .into_iter()
            .filter(|card| phases.contains(&classify(card, now)))
            .collect())
    }
}
