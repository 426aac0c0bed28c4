// src/session.rs
// A single study session over one deck: pull due batches, serve cards,
// record answers. The caller owns the wait for the user's rating; nothing
// here blocks.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use log::debug;

use crate::deck::Card;
use crate::error::Result;
use crate::fsrs::{NextIntervalPreview, Rating};
use crate::scheduler::CardScheduler;

/// How soon a failed card resurfaces within the session: after
/// `5 - lapses` other cards, never fewer than two.
fn cooldown_distance(lapses: u32) -> usize {
    5_u32.saturating_sub(lapses).max(2) as usize
}

pub struct StudySession {
    scheduler: CardScheduler,
    deck_id: i64,
    batch_size: usize,
    queue: VecDeque<Card>,
    current: Option<Card>,
    session_total: usize,
    session_reviews_complete: usize,
    hard_cards_this_session: Vec<i64>,
    lapses_this_session: HashMap<i64, u32>,
    exhausted: bool,
}

impl StudySession {
    pub fn new(
        scheduler: CardScheduler,
        deck_id: i64,
        batch_size: usize,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let mut session = StudySession {
            scheduler,
            deck_id,
            batch_size: batch_size.max(1),
            queue: VecDeque::new(),
            current: None,
            session_total: 0,
            session_reviews_complete: 0,
            hard_cards_this_session: Vec::new(),
            lapses_this_session: HashMap::new(),
            exhausted: false,
        };
        session.refill(now)?;
        Ok(session)
    }

    /// Serves the next card, refilling from storage when the in-memory
    /// queue runs dry. `None` means the session is complete.
    pub fn next_card(&mut self, now: DateTime<Utc>) -> Result<Option<Card>> {
        if self.queue.is_empty() && !self.exhausted {
            self.refill(now)?;
        }
        self.current = self.queue.pop_front();
        Ok(self.current.clone())
    }

    /// Preview intervals for the card currently on screen.
    pub fn preview(&self, now: DateTime<Utc>) -> Result<Option<NextIntervalPreview>> {
        match &self.current {
            Some(card) => Ok(Some(self.scheduler.preview_intervals(card, now)?)),
            None => Ok(None),
        }
    }

    /// Records the rating for the current card and advances the session.
    /// Again-rated cards re-enter the queue after a short cooldown so the
    /// user re-sees them before the session ends.
    pub fn answer(&mut self, rating: Rating, now: DateTime<Utc>) -> Result<()> {
        let Some(card) = self.current.take() else {
            return Ok(());
        };
        let updated = self.scheduler.record_rating(card.card_id, rating, now)?;

        match rating {
            Rating::Again => {
                let lapses = self.lapses_this_session.entry(updated.card_id).or_insert(0);
                *lapses += 1;
                let at = cooldown_distance(*lapses).min(self.queue.len());
                debug!(
                    "card {} lapsed; requeueing {} cards ahead",
                    updated.card_id, at
                );
                self.queue.insert(at, updated);
            }
            _ => {
                self.session_reviews_complete += 1;
                if rating == Rating::Hard
                    && !self.hard_cards_this_session.contains(&updated.card_id)
                {
                    self.hard_cards_this_session.push(updated.card_id);
                }
            }
        }
        Ok(())
    }

    pub fn reviews_complete(&self) -> usize {
        self.session_reviews_complete
    }

    pub fn total_session_cards(&self) -> usize {
        self.session_total
    }

    pub fn hard_cards(&self) -> &[i64] {
        &self.hard_cards_this_session
    }

    pub fn is_done(&self) -> bool {
        self.current.is_none() && self.queue.is_empty() && self.exhausted
    }

    fn refill(&mut self, now: DateTime<Utc>) -> Result<()> {
        let batch = self
            .scheduler
            .fetch_due_batch(self.deck_id, self.batch_size, now)?;
        if batch.is_empty() {
            self.exhausted = true;
            return Ok(());
        }
        self.session_total += batch.len();
        self.queue.extend(batch);
        Ok(())
    }
}
