// src/storage/mod.rs
// All data persistence: the SQLite collection and the append-only review log.

pub mod db;
pub mod review_log;

pub use self::db::Storage;
pub use self::review_log::ReviewLogEntry;
