//! Persistence for the concierge platform.
//!
//! Two families of storage live here:
//!
//! - **Server records**: relayed transcript lines, stored call summaries and
//!   staff orders. These are plain functions over a `rusqlite::Connection`,
//!   called by the server from `spawn_blocking`.
//! - **Local state**: the durable key/value documents the session engine
//!   keeps across restarts (`activeOrders`, `checkpoints`). These go through
//!   the [`LocalStore`] trait so the engine can run against SQLite or an
//!   in-memory map.
//!
//! Everything that touches SQLite sits behind the default `sqlite` feature.
//! The session engine builds without it and links only the trait and
//! [`MemoryLocalStore`].

use thiserror::Error;

mod local;
#[cfg(feature = "sqlite")]
mod orders;
#[cfg(feature = "sqlite")]
mod summaries;
#[cfg(feature = "sqlite")]
mod transcripts;

pub use local::{read_document, write_document, LocalStore, MemoryLocalStore};
#[cfg(feature = "sqlite")]
pub use local::SqliteLocalStore;
#[cfg(feature = "sqlite")]
pub use orders::{
    create_order, get_order, list_orders, list_orders_by_room, update_order_status, OrderFilter,
};
#[cfg(feature = "sqlite")]
pub use summaries::{
    get_call_summary, list_recent_summaries, upsert_call_summary, StoredSummary,
    UpsertSummaryParams,
};
#[cfg(feature = "sqlite")]
pub use transcripts::{list_transcripts, record_transcript, RecordTranscriptParams, StoredTranscript};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[cfg(feature = "sqlite")]
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[cfg(feature = "sqlite")]
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Formats a timestamp the way every table stores it.
///
/// Fixed millisecond precision with a `Z` suffix keeps the text form
/// lexically ordered, so range filters can compare strings.
#[cfg(feature = "sqlite")]
pub(crate) fn db_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
