// src/storage/review_log.rs
// The append-only review log: audit trail for "studied today" and the
// optimizer's training input.

use chrono::{DateTime, Duration, Local, LocalResult, NaiveDate, TimeZone, Utc};
use rusqlite::params;

use crate::error::Result;
use crate::fsrs::Rating;
use crate::storage::db::{ts_from_sql, ts_to_sql, Storage};

/// One rating event, captured before the card's state was updated.
/// Immutable once written; rows disappear only when their card is deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewLogEntry {
    pub card_id: i64,
    pub reviewed_at: DateTime<Utc>,
    pub rating: Rating,
    pub stability_before: Option<f64>,
    pub difficulty_before: Option<f64>,
    /// Days since the previous review; zero for a first rating.
    pub elapsed_days: f64,
}

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<ReviewLogEntry> {
    let reviewed_at: String = row.get(1)?;
    let rating: u32 = row.get(2)?;
    Ok(ReviewLogEntry {
        card_id: row.get(0)?,
        reviewed_at: ts_from_sql(1, &reviewed_at)?,
        rating: Rating::from_value(rating).map_err(|_| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Integer,
                format!("invalid rating value {rating}").into(),
            )
        })?,
        stability_before: row.get(3)?,
        difficulty_before: row.get(4)?,
        elapsed_days: row.get(5)?,
    })
}

const ENTRY_COLUMNS: &str =
    "card_id, reviewed_at, rating, stability_before, difficulty_before, elapsed_days";

impl Storage {
    /// Every review ever recorded, grouped by card and chronological within
    /// each card. This is the optimizer's training set ordering.
    pub fn reviews(&self) -> Result<Vec<ReviewLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM reviews ORDER BY card_id, reviewed_at, review_id"
        ))?;
        let rows = stmt.query_map([], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn reviews_for_card(&self, card_id: i64) -> Result<Vec<ReviewLogEntry>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM reviews
             WHERE card_id = ?1 ORDER BY reviewed_at, review_id"
        ))?;
        let rows = stmt.query_map(params![card_id], entry_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Number of review events recorded on the given local calendar day.
    /// The day becomes a half-open UTC timestamp range pushed into SQL;
    /// the fixed-precision RFC 3339 encoding keeps the text comparison
    /// chronological.
    pub fn count_reviews_on(&self, day: NaiveDate) -> Result<u32> {
        let start = local_day_start(day);
        let end = local_day_start(day + Duration::days(1));
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM reviews WHERE reviewed_at >= ?1 AND reviewed_at < ?2",
            params![ts_to_sql(start), ts_to_sql(end)],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

/// UTC instant at which the given local calendar day begins. A DST shift
/// that repeats midnight resolves to the earlier reading; one that skips
/// midnight falls back to the UTC wall clock.
fn local_day_start(day: NaiveDate) -> DateTime<Utc> {
    let midnight = day.and_hms_opt(0, 0, 0).expect("midnight is a valid time");
    match midnight.and_local_timezone(Local) {
        LocalResult::Single(t) | LocalResult::Ambiguous(t, _) => t.with_timezone(&Utc),
        LocalResult::None => Utc.from_utc_datetime(&midnight),
    }
}
