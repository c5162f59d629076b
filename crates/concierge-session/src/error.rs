//! Error types for the session engine.

use std::time::Duration;

use concierge_voice::VoiceError;

use crate::machine::SessionState;

/// Errors surfaced to the caller of a user-initiated session action.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The action is not available in the current state.
    #[error("cannot {action} while the session is {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    /// The voice service rejected or failed the request.
    #[error("voice service error: {0}")]
    Voice(#[from] VoiceError),

    /// The voice service did not acknowledge the call in time.
    #[error("call was not acknowledged within {0:?}")]
    StartTimedOut(Duration),

    /// A backend request failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("relay error: {0}")]
    Relay(#[from] RelayError),
}

/// Errors from the concierge HTTP backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Errors from the relay client.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay connection failed: {0}")]
    Connect(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("relay connection closed")]
    Closed,

    #[error("relay frame serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
