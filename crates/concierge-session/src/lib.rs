//! Call-session engine for the hotel voice concierge.
//!
//! Coordinates one guest call at a time: transcript events from the voice
//! service and the WebSocket relay are normalized into a single ordered
//! ledger, and when the call ends the ledger is summarized and reconciled
//! into a structured order and a list of service requests.
//!
//! # Components
//!
//! | Module | Role |
//! |--------|------|
//! | [`normalizer`] | SDK events and relay frames to canonical [`TranscriptEvent`](concierge_types::TranscriptEvent)s |
//! | [`ledger`] | Ordered, idempotent transcript log with interim/final replacement |
//! | [`machine`] | `Idle → Connecting → Active → Summarizing → Completed` |
//! | [`reconcile`] | Summary generation outcome to order, summary and requests |
//! | [`parser`] | Pattern-based extraction from summary text |
//! | [`checkpoint`] | Retained snapshots of session state |
//! | [`active_orders`] | Confirmed orders and their one-hour countdown |
//!
//! # Usage
//!
//! ```rust,ignore
//! let mut session = SessionMachine::new(config, voice, api, store).await;
//! session.start_call().await?;
//! // ... drive inputs with `session.process_next().await` ...
//! session.end_call().await?;
//! session.await_resolution().await;
//! println!("{:?}", session.order_summary());
//! ```

pub mod active_orders;
pub mod backend;
pub mod checkpoint;
mod config;
mod error;
pub mod ledger;
pub mod machine;
pub mod normalizer;
pub mod parser;
pub mod reconcile;
pub mod relay;

pub use active_orders::{ActiveOrderTracker, CountdownTicker, ACTIVE_ORDERS_KEY};
pub use backend::{ConciergeApi, HttpConciergeApi, SummaryRequest, SummaryResponse};
pub use checkpoint::{Checkpoint, CheckpointStore, SessionSnapshot, CHECKPOINTS_KEY, MAX_CHECKPOINTS};
pub use config::{SessionConfig, MIN_TRANSCRIPTS_FOR_SUMMARY};
pub use error::{BackendError, RelayError, SessionError};
pub use ledger::{AppendOutcome, TranscriptLedger};
pub use machine::{display_duration, CallSession, SessionMachine, SessionState};
pub use normalizer::{EventNormalizer, LiveCaption, RelayInput};
pub use parser::{extract_service_requests, parse_order_details, ParsedOrder};
pub use reconcile::{merge_order, SummaryOutcome, SummaryResolution};
pub use relay::RelayClient;
