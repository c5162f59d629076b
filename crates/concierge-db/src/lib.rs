//! Database layer for the concierge server and session engine.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization
//! and embedded SQL migrations. Every table (relayed transcripts, stored
//! call summaries, staff orders and the durable local-state documents) is
//! created through versioned migrations managed by this crate.
//!
//! Migration SQL files are compiled into the binary via `include_str!`, so
//! the schema always ships with the code that depends on it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, open_database, DbError, DbPool, DbRuntimeSettings, PoolError};
