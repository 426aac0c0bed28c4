// src/deck/aggregator.rs
// Derived deck counts for the dashboard, recomputed from card states on
// every read.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};

use crate::deck::DeckSummary;
use crate::error::Result;
use crate::scheduler::{classify, CardPhase};
use crate::storage::Storage;

#[derive(Clone)]
pub struct DeckAggregator {
    storage: Arc<Storage>,
}

impl DeckAggregator {
    pub fn new(storage: Arc<Storage>) -> Self {
        DeckAggregator { storage }
    }

    /// Buckets every card in the deck by phase against `now`. O(cards in
    /// deck); nothing is cached, so the counts always reflect current
    /// card states.
    pub fn summarize(&self, deck_id: i64, now: DateTime<Utc>) -> Result<DeckSummary> {
        let deck = self.storage.deck(deck_id)?;
        let mut summary = DeckSummary {
            deck_id: deck.deck_id,
            deck_name: deck.deck_name,
            to_learn: 0,
            learning: 0,
            to_review: 0,
        };
        for card in self.storage.cards_in_deck(deck_id)? {
            match classify(&card, now) {
                CardPhase::New => summary.to_learn += 1,
                CardPhase::Learning => summary.learning += 1,
                CardPhase::ToReview => summary.to_review += 1,
                CardPhase::NotDue => {}
            }
        }
        Ok(summary)
    }

    pub fn summarize_all(&self, now: DateTime<Utc>) -> Result<Vec<DeckSummary>> {
        self.storage
            .decks()?
            .into_iter()
            .map(|deck| self.summarize(deck.deck_id, now))
            .collect()
    }

    /// Review events recorded during the current local calendar day.
    pub fn count_studied_today(&self) -> Result<u32> {
        self.storage.count_reviews_on(Local::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deck::template::TemplateKind;
    use crate::fsrs::params::{ParameterStore, ParameterVector};
    use crate::fsrs::Rating;
    use crate::scheduler::CardScheduler;
    use chrono::Duration;

    #[test]
    fn test_summary_buckets() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let params = Arc::new(ParameterStore::new(ParameterVector::default()).unwrap());
        let scheduler = CardScheduler::new(Arc::clone(&storage), params);
        let aggregator = DeckAggregator::new(Arc::clone(&storage));

        let deck_id = storage.create_deck("mixed").unwrap();
        let template_id = storage
            .create_template(deck_id, "basic", TemplateKind::Basic, &["F".to_string()])
            .unwrap();
        let now = Utc::now();
        let fields = vec!["f".to_string()];

        // One New card.
        storage.create_card(deck_id, template_id, &fields, now).unwrap();
        // One graduated card, overdue since yesterday.
        let overdue = storage.create_card(deck_id, template_id, &fields, now).unwrap();
        scheduler
            .record_rating(overdue, Rating::Good, now - Duration::days(3))
            .unwrap();
        // One graduated card, due in the future.
        let future = storage.create_card(deck_id, template_id, &fields, now).unwrap();
        scheduler.record_rating(future, Rating::Easy, now).unwrap();
        // One lapsed card, back in same-day relearning.
        let lapsed = storage.create_card(deck_id, template_id, &fields, now).unwrap();
        scheduler
            .record_rating(lapsed, Rating::Good, now - Duration::days(3))
            .unwrap();
        scheduler.record_rating(lapsed, Rating::Again, now).unwrap();

        let summary = aggregator.summarize(deck_id, now).unwrap();
        assert_eq!(summary.to_learn, 1);
        assert_eq!(summary.to_review, 1);
        assert_eq!(summary.learning, 1);
    }

    #[test]
    fn test_studied_today_counts_log_rows() {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let params = Arc::new(ParameterStore::new(ParameterVector::default()).unwrap());
        let scheduler = CardScheduler::new(Arc::clone(&storage), params);
        let aggregator = DeckAggregator::new(Arc::clone(&storage));

        let deck_id = storage.create_deck("d").unwrap();
        let template_id = storage
            .create_template(deck_id, "basic", TemplateKind::Basic, &["F".to_string()])
            .unwrap();
        let now = Utc::now();
        let card = storage
            .create_card(deck_id, template_id, &["f".to_string()], now)
            .unwrap();

        assert_eq!(aggregator.count_studied_today().unwrap(), 0);
        scheduler.record_rating(card, Rating::Good, now).unwrap();
        scheduler
            .record_rating(card, Rating::Good, now + Duration::minutes(1))
            .unwrap();
        assert_eq!(aggregator.count_studied_today().unwrap(), 2);
    }
}
