// src/scheduler.rs
// Per-card lifecycle: classification, due-batch selection, and the single
// state-mutating entry point that applies a rating.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::deck::Card;
use crate::error::Result;
use crate::fsrs::params::ParameterStore;
use crate::fsrs::{MemoryModel, NextIntervalPreview, Rating};
use crate::storage::{ReviewLogEntry, Storage};

/// Where a card sits in the New -> Learning -> Review lifecycle, relative
/// to `now`. A lapse demotes the interval but never returns a card to New.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardPhase {
    /// Never rated; no memory state yet.
    New,
    /// Last interval was sub-day: still in short-term repetition.
    Learning,
    /// Graduated and due now.
    ToReview,
    /// Graduated but not due yet; excluded from sessions.
    NotDue,
}

pub fn classify(card: &Card, now: DateTime<Utc>) -> CardPhase {
    if card.is_new() {
        CardPhase::New
    } else if card.scheduled_days < 1.0 {
        CardPhase::Learning
    } else if card.due <= now {
        CardPhase::ToReview
    } else {
        CardPhase::NotDue
    }
}

fn elapsed_days(card: &Card, now: DateTime<Utc>) -> f64 {
    match card.last_review {
        Some(last) => ((now - last).num_milliseconds() as f64 / 86_400_000.0).max(0.0),
        None => 0.0,
    }
}

fn days_to_duration(days: f64) -> Duration {
    Duration::milliseconds((days * 86_400_000.0).round() as i64)
}

/// Orchestrates reviews for cards in storage against the current parameter
/// snapshot. Cheap to clone; all clones share the same storage and store.
#[derive(Clone)]
pub struct CardScheduler {
    storage: Arc<Storage>,
    params: Arc<ParameterStore>,
}

impl CardScheduler {
    pub fn new(storage: Arc<Storage>, params: Arc<ParameterStore>) -> Self {
        CardScheduler { storage, params }
    }

    /// Up to `limit` due cards, oldest due first (card id breaks ties).
    /// Restartable: callers request successive batches as the session
    /// progresses, and an empty batch means the deck is done for now.
    pub fn fetch_due_batch(
        &self,
        deck_id: i64,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Card>> {
        self.storage.due_cards(deck_id, now, limit)
    }

    /// Candidate intervals for each rating, for display on the rating
    /// buttons. Read-only; safe to call repeatedly and to retry.
    pub fn preview_intervals(&self, card: &Card, now: DateTime<Utc>) -> Result<NextIntervalPreview> {
        let params = self.params.snapshot();
        let model = MemoryModel::new(&params)?;
        Ok(model.preview_all_ratings(
            card.memory_state,
            elapsed_days(card, now),
            params.desired_retention,
        ))
    }

    /// Applies one rating: updates memory state, schedules the next review,
    /// and appends the review-log entry, all in one transaction. The only
    /// operation that mutates card state.
    pub fn record_rating(&self, card_id: i64, rating: Rating, now: DateTime<Utc>) -> Result<Card> {
        let card = self.storage.card(card_id)?;
        let params = self.params.snapshot();
        let model = MemoryModel::new(&params)?;

        let elapsed = elapsed_days(&card, now);
        let next_state = match card.memory_state {
            Some(state) => model.next_state(state, elapsed, rating),
            None => model.initial_state(rating),
        };
        let scheduled_days =
            model.interval_for(rating, next_state.stability, params.desired_retention);

        let updated = Card {
            due: now + days_to_duration(scheduled_days),
            memory_state: Some(next_state),
            scheduled_days,
            last_review: Some(now),
            ..card.clone()
        };
        let entry = ReviewLogEntry {
            card_id,
            reviewed_at: now,
            rating,
            stability_before: card.memory_state.map(|s| s.stability),
            difficulty_before: card.memory_state.map(|s| s.difficulty),
            elapsed_days: elapsed,
        };
        self.storage.commit_review(&updated, &entry)?;
        Ok(updated)
    }
}
