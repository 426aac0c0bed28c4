// src/deck/mod.rs
// Decks, cards, and templates: the data shapes the scheduling core reads
// and writes.

pub mod aggregator;
pub mod template;

use chrono::{DateTime, Utc};

use crate::fsrs::MemoryState;
use template::TemplateKind;

/// Positional card fields are stored as one string joined on the ASCII
/// unit separator, the same convention Anki uses for note fields.
pub const FIELD_SEPARATOR: char = '\u{1f}';

pub fn join_fields(fields: &[String]) -> String {
    fields.join("\u{1f}")
}

pub fn split_fields(merged: &str) -> Vec<String> {
    merged.split(FIELD_SEPARATOR).map(String::from).collect()
}

/// One reviewable card. `memory_state` and `last_review` are both `None`
/// until the first rating, and both set from then on; that pairing is the
/// New-card invariant the scheduler relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct Card {
    pub card_id: i64,
    pub deck_id: i64,
    pub template_id: i64,
    /// Ordered field contents; positions correspond to the template's
    /// field definitions.
    pub fields: Vec<String>,
    /// The instant at or after which the card is eligible for review.
    pub due: DateTime<Utc>,
    pub memory_state: Option<MemoryState>,
    /// Interval chosen at the last review, in fractional days. Sub-day
    /// values mean the card is still in short-term relearning.
    pub scheduled_days: f64,
    pub last_review: Option<DateTime<Utc>>,
}

impl Card {
    pub fn is_new(&self) -> bool {
        self.memory_state.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deck {
    pub deck_id: i64,
    pub deck_name: String,
}

/// Dashboard counts for one deck. Always derived from current card states
/// on read, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct DeckSummary {
    pub deck_id: i64,
    pub deck_name: String,
    pub to_learn: u32,
    pub learning: u32,
    pub to_review: u32,
}

/// Field layout shared by a set of cards. Scheduling never looks inside;
/// templates only matter when card fields are parsed for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub template_id: i64,
    pub deck_id: i64,
    pub name: String,
    pub kind: TemplateKind,
    pub field_names: Vec<String>,
}
