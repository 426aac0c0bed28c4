// src/storage/db.rs
// Manages the SQLite collection: decks, templates, cards, and the review
// log rows the scheduler appends.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::deck::template::TemplateKind;
use crate::deck::{join_fields, split_fields, Card, Deck, Template};
use crate::error::{MemodeckError, Result};
use crate::fsrs::MemoryState;
use crate::storage::review_log::ReviewLogEntry;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS decks (
        deck_id     INTEGER PRIMARY KEY,
        name        TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS templates (
        template_id INTEGER PRIMARY KEY,
        deck_id     INTEGER NOT NULL REFERENCES decks(deck_id) ON DELETE CASCADE,
        name        TEXT NOT NULL,
        kind        TEXT NOT NULL,
        field_names TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS cards (
        card_id        INTEGER PRIMARY KEY,
        deck_id        INTEGER NOT NULL REFERENCES decks(deck_id) ON DELETE CASCADE,
        template_id    INTEGER NOT NULL REFERENCES templates(template_id) ON DELETE CASCADE,
        fields         TEXT NOT NULL,
        due            TEXT NOT NULL,
        stability      REAL,
        difficulty     REAL,
        scheduled_days REAL NOT NULL DEFAULT 0,
        last_review    TEXT
    );
    CREATE TABLE IF NOT EXISTS reviews (
        review_id         INTEGER PRIMARY KEY,
        card_id           INTEGER NOT NULL REFERENCES cards(card_id) ON DELETE CASCADE,
        reviewed_at       TEXT NOT NULL,
        rating            INTEGER NOT NULL,
        stability_before  REAL,
        difficulty_before REAL,
        elapsed_days      REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_cards_deck_due ON cards(deck_id, due);
    CREATE INDEX IF NOT EXISTS idx_reviews_card ON reviews(card_id, reviewed_at);
";

const CARD_COLUMNS: &str =
    "card_id, deck_id, template_id, fields, due, stability, difficulty, scheduled_days, last_review";

/// Timestamps are persisted as RFC 3339 text with fixed millisecond
/// precision so lexicographic order in SQL matches chronological order.
pub(crate) fn ts_to_sql(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn ts_from_sql(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

pub(crate) fn card_from_row(row: &Row) -> rusqlite::Result<Card> {
    let fields: String = row.get(3)?;
    let due: String = row.get(4)?;
    let stability: Option<f64> = row.get(5)?;
    let difficulty: Option<f64> = row.get(6)?;
    let last_review: Option<String> = row.get(8)?;
    let memory_state = match (stability, difficulty) {
        (Some(stability), Some(difficulty)) => Some(MemoryState {
            stability,
            difficulty,
        }),
        _ => None,
    };
    Ok(Card {
        card_id: row.get(0)?,
        deck_id: row.get(1)?,
        template_id: row.get(2)?,
        fields: split_fields(&fields),
        due: ts_from_sql(4, &due)?,
        memory_state,
        scheduled_days: row.get(7)?,
        last_review: last_review
            .as_deref()
            .map(|s| ts_from_sql(8, s))
            .transpose()?,
    })
}

pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (creating if necessary) a collection file.
    pub fn open(path: &Path) -> Result<Self> {
        Storage::init(Connection::open(path)?)
    }

    /// In-memory collection, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Storage::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Cascades (deck -> cards -> reviews) rely on foreign keys being on.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Storage {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("storage mutex poisoned")
    }

    // --- decks ---

    pub fn create_deck(&self, name: &str) -> Result<i64> {
        let conn = self.conn();
        conn.execute("INSERT INTO decks (name) VALUES (?1)", params![name])?;
        Ok(conn.last_insert_rowid())
    }

    pub fn decks(&self) -> Result<Vec<Deck>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT deck_id, name FROM decks ORDER BY deck_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(Deck {
                deck_id: row.get(0)?,
                deck_name: row.get(1)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn deck(&self, deck_id: i64) -> Result<Deck> {
        self.conn()
            .query_row(
                "SELECT deck_id, name FROM decks WHERE deck_id = ?1",
                params![deck_id],
                |row| {
                    Ok(Deck {
                        deck_id: row.get(0)?,
                        deck_name: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or(MemodeckError::DeckNotFound(deck_id))
    }

    /// Deletes a deck; its cards and their review-log entries cascade.
    pub fn delete_deck(&self, deck_id: i64) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM decks WHERE deck_id = ?1", params![deck_id])?;
        if affected == 0 {
            return Err(MemodeckError::DeckNotFound(deck_id));
        }
        Ok(())
    }

    // --- templates ---

    pub fn create_template(
        &self,
        deck_id: i64,
        name: &str,
        kind: TemplateKind,
        field_names: &[String],
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO templates (deck_id, name, kind, field_names) VALUES (?1, ?2, ?3, ?4)",
            params![deck_id, name, kind.as_str(), join_fields(field_names)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn template(&self, template_id: i64) -> Result<Template> {
        let row = self
            .conn()
            .query_row(
                "SELECT template_id, deck_id, name, kind, field_names
                 FROM templates WHERE template_id = ?1",
                params![template_id],
                |row| {
                    let kind: String = row.get(3)?;
                    let names: String = row.get(4)?;
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        kind,
                        names,
                    ))
                },
            )
            .optional()?
            .ok_or(MemodeckError::TemplateNotFound(template_id))?;
        Ok(Template {
            template_id: row.0,
            deck_id: row.1,
            name: row.2,
            kind: TemplateKind::parse(&row.3)?,
            field_names: split_fields(&row.4),
        })
    }

    // --- cards ---

    /// New cards start with no memory state and `due = now`, so they are
    /// immediately eligible for study.
    pub fn create_card(
        &self,
        deck_id: i64,
        template_id: i64,
        fields: &[String],
        now: DateTime<Utc>,
    ) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO cards
             (deck_id, template_id, fields, due, stability, difficulty, scheduled_days, last_review)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, 0, NULL)",
            params![deck_id, template_id, join_fields(fields), ts_to_sql(now)],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn card(&self, card_id: i64) -> Result<Card> {
        self.conn()
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE card_id = ?1"),
                params![card_id],
                card_from_row,
            )
            .optional()?
            .ok_or(MemodeckError::CardNotFound(card_id))
    }

    pub fn cards_in_deck(&self, deck_id: i64) -> Result<Vec<Card>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE deck_id = ?1 ORDER BY card_id"
        ))?;
        let rows = stmt.query_map(params![deck_id], card_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Cards in the deck with `due <= now`, oldest due first, card id as a
    /// deterministic tiebreaker. Successive calls with the same state
    /// return the identical ordered list.
    pub fn due_cards(&self, deck_id: i64, now: DateTime<Utc>, limit: usize) -> Result<Vec<Card>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards
             WHERE deck_id = ?1 AND due <= ?2
             ORDER BY due, card_id
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(params![deck_id, ts_to_sql(now), limit as i64], card_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Cards matching any of the given decks and templates (empty slice
    /// means "no constraint"), ordered by due date.
    pub fn filter_cards(&self, deck_ids: &[i64], template_ids: &[i64]) -> Result<Vec<Card>> {
        let mut sql = format!("SELECT {CARD_COLUMNS} FROM cards");
        let mut clauses = Vec::new();
        if !deck_ids.is_empty() {
            clauses.push(format!(
                "deck_id IN ({})",
                vec!["?"; deck_ids.len()].join(",")
            ));
        }
        if !template_ids.is_empty() {
            clauses.push(format!(
                "template_id IN ({})",
                vec!["?"; template_ids.len()].join(",")
            ));
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY due, card_id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let bind: Vec<i64> = deck_ids.iter().chain(template_ids.iter()).copied().collect();
        let rows = stmt.query_map(params_from_iter(bind), card_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn update_card_fields(&self, card_id: i64, fields: &[String]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE cards SET fields = ?1 WHERE card_id = ?2",
            params![join_fields(fields), card_id],
        )?;
        if affected == 0 {
            return Err(MemodeckError::CardNotFound(card_id));
        }
        Ok(())
    }

    /// Deletes a card; its review-log entries cascade with it.
    pub fn delete_card(&self, card_id: i64) -> Result<()> {
        let affected = self
            .conn()
            .execute("DELETE FROM cards WHERE card_id = ?1", params![card_id])?;
        if affected == 0 {
            return Err(MemodeckError::CardNotFound(card_id));
        }
        Ok(())
    }

    /// Applies one rating: appends the review-log entry and writes the
    /// card's new scheduling state in a single transaction, so the log and
    /// the card can never diverge.
    pub fn commit_review(&self, card: &Card, entry: &ReviewLogEntry) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO reviews
             (card_id, reviewed_at, rating, stability_before, difficulty_before, elapsed_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.card_id,
                ts_to_sql(entry.reviewed_at),
                entry.rating.value(),
                entry.stability_before,
                entry.difficulty_before,
                entry.elapsed_days,
            ],
        )?;
        let affected = tx.execute(
            "UPDATE cards
             SET due = ?1, stability = ?2, difficulty = ?3, scheduled_days = ?4, last_review = ?5
             WHERE card_id = ?6",
            params![
                ts_to_sql(card.due),
                card.memory_state.map(|s| s.stability),
                card.memory_state.map(|s| s.difficulty),
                card.scheduled_days,
                card.last_review.map(ts_to_sql),
                card.card_id,
            ],
        )?;
        if affected == 0 {
            // Dropping the transaction rolls back the log insert.
            return Err(MemodeckError::CardNotFound(card.card_id));
        }
        tx.commit()?;
        debug!(
            "committed review for card {} (rating {:?}, next interval {:.2}d)",
            card.card_id, entry.rating, card.scheduled_days
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsrs::Rating;

    fn fixture() -> (Storage, i64, i64) {
        let storage = Storage::open_in_memory().unwrap();
        let deck_id = storage.create_deck("default").unwrap();
        let template_id = storage
            .create_template(
                deck_id,
                "front/back",
                TemplateKind::Basic,
                &["Front".to_string(), "Back".to_string()],
            )
            .unwrap();
        (storage, deck_id, template_id)
    }

    fn card_fields() -> Vec<String> {
        vec!["salut".to_string(), "hello".to_string()]
    }

    #[test]
    fn test_new_card_shape() {
        let (storage, deck_id, template_id) = fixture();
        let now = Utc::now();
        let id = storage
            .create_card(deck_id, template_id, &card_fields(), now)
            .unwrap();
        let card = storage.card(id).unwrap();
        assert!(card.is_new());
        assert!(card.last_review.is_none());
        assert_eq!(card.scheduled_days, 0.0);
        assert_eq!(card.fields, card_fields());
        // Millisecond precision survives the round trip.
        assert_eq!(ts_to_sql(card.due), ts_to_sql(now));
    }

    #[test]
    fn test_due_query_order_and_limit() {
        let (storage, deck_id, template_id) = fixture();
        let now = Utc::now();
        let overdue = storage
            .create_card(deck_id, template_id, &card_fields(), now - chrono::Duration::days(2))
            .unwrap();
        let fresh = storage
            .create_card(deck_id, template_id, &card_fields(), now)
            .unwrap();
        let future = storage
            .create_card(deck_id, template_id, &card_fields(), now + chrono::Duration::days(5))
            .unwrap();

        let due = storage.due_cards(deck_id, now, 10).unwrap();
        let ids: Vec<i64> = due.iter().map(|c| c.card_id).collect();
        assert_eq!(ids, vec![overdue, fresh]);
        assert!(!ids.contains(&future));

        let limited = storage.due_cards(deck_id, now, 1).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].card_id, overdue);
    }

    #[test]
    fn test_card_crud() {
        let (storage, deck_id, template_id) = fixture();
        let id = storage
            .create_card(deck_id, template_id, &card_fields(), Utc::now())
            .unwrap();
        storage
            .update_card_fields(id, &["bonjour".to_string(), "hello".to_string()])
            .unwrap();
        assert_eq!(storage.card(id).unwrap().fields[0], "bonjour");

        storage.delete_card(id).unwrap();
        assert!(matches!(
            storage.card(id),
            Err(MemodeckError::CardNotFound(_))
        ));
        assert!(matches!(
            storage.delete_card(id),
            Err(MemodeckError::CardNotFound(_))
        ));
    }

    #[test]
    fn test_delete_cascades_to_reviews() {
        let (storage, deck_id, template_id) = fixture();
        let now = Utc::now();
        let id = storage
            .create_card(deck_id, template_id, &card_fields(), now)
            .unwrap();
        let mut card = storage.card(id).unwrap();
        card.memory_state = Some(MemoryState {
            stability: 2.0,
            difficulty: 5.0,
        });
        card.scheduled_days = 2.0;
        card.last_review = Some(now);
        storage
            .commit_review(
                &card,
                &ReviewLogEntry {
                    card_id: id,
                    reviewed_at: now,
                    rating: Rating::Good,
                    stability_before: None,
                    difficulty_before: None,
                    elapsed_days: 0.0,
                },
            )
            .unwrap();
        assert_eq!(storage.reviews().unwrap().len(), 1);

        storage.delete_deck(deck_id).unwrap();
        assert!(storage.reviews().unwrap().is_empty());
    }

    #[test]
    fn test_commit_review_rolls_back_on_missing_card() {
        let (storage, deck_id, template_id) = fixture();
        let now = Utc::now();
        let id = storage
            .create_card(deck_id, template_id, &card_fields(), now)
            .unwrap();
        let mut card = storage.card(id).unwrap();
        card.memory_state = Some(MemoryState {
            stability: 2.0,
            difficulty: 5.0,
        });
        card.card_id = 9999; // no such row
        let entry = ReviewLogEntry {
            card_id: 9999,
            reviewed_at: now,
            rating: Rating::Good,
            stability_before: None,
            difficulty_before: None,
            elapsed_days: 0.0,
        };
        // FK on reviews.card_id rejects the insert; nothing is committed.
        assert!(storage.commit_review(&card, &entry).is_err());
        assert!(storage.reviews().unwrap().is_empty());
    }

    #[test]
    fn test_filter_cards_by_deck_and_template() {
        let (storage, deck_id, template_id) = fixture();
        let other_deck = storage.create_deck("other").unwrap();
        let other_template = storage
            .create_template(other_deck, "t", TemplateKind::Choice, &["Q".to_string()])
            .unwrap();
        let now = Utc::now();
        let a = storage
            .create_card(deck_id, template_id, &card_fields(), now)
            .unwrap();
        let b = storage
            .create_card(other_deck, other_template, &card_fields(), now)
            .unwrap();

        let all = storage.filter_cards(&[], &[]).unwrap();
        assert_eq!(all.len(), 2);
        let only_a = storage.filter_cards(&[deck_id], &[]).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].card_id, a);
        let only_b = storage.filter_cards(&[], &[other_template]).unwrap();
        assert_eq!(only_b.len(), 1);
        assert_eq!(only_b[0].card_id, b);
    }

    #[test]
    fn test_template_round_trip() {
        let (storage, _deck, template_id) = fixture();
        let template = storage.template(template_id).unwrap();
        assert_eq!(template.kind, TemplateKind::Basic);
        assert_eq!(template.field_names, vec!["Front", "Back"]);
        assert!(matches!(
            storage.template(404),
            Err(MemodeckError::TemplateNotFound(404))
        ));
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.db");
        {
            let storage = Storage::open(&path).unwrap();
            storage.create_deck("persisted").unwrap();
        }
        let storage = Storage::open(&path).unwrap();
        assert_eq!(storage.decks().unwrap().len(), 1);
    }
}
