//! WebSocket relay frames.
//!
//! Clients send [`ClientFrame`]s; the server answers and fans out
//! [`ServerFrame`]s to every subscriber of the same call id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Role;

/// A transcript line as sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptFrame {
    pub call_id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<String>,
}

impl TranscriptFrame {
    /// The id grouping revisions of one utterance, preferring `utteranceId`.
    pub fn revision_key(&self) -> Option<&str> {
        self.utterance_id
            .as_deref()
            .or(self.segment_id.as_deref())
    }
}

/// Frames a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientFrame {
    /// Subscribes the connection to a call id.
    #[serde(rename = "init", rename_all = "camelCase")]
    Init { call_id: String },
    #[serde(rename = "transcript")]
    Transcript(TranscriptFrame),
    #[serde(rename = "transcript(final)")]
    FinalTranscript(TranscriptFrame),
}

/// A transcript line as fanned out by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastTranscript {
    #[serde(flatten)]
    pub line: TranscriptFrame,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
}

/// Frames the relay sends to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerFrame {
    #[serde(rename = "connected")]
    Connected { message: String },
    #[serde(rename = "transcript")]
    Transcript(BroadcastTranscript),
    #[serde(rename = "transcript(final)")]
    FinalTranscript(BroadcastTranscript),
    /// A streamed chunk (`is_final == false`) or the complete summary text.
    #[serde(rename = "assistantResponse")]
    AssistantResponse {
        #[serde(rename = "callId")]
        call_id: String,
        assistant_reply_text: String,
        #[serde(rename = "isFinal", default)]
        is_final: bool,
        timestamp: DateTime<Utc>,
    },
    #[serde(rename = "order_status_update")]
    OrderStatusUpdate {
        #[serde(rename = "orderId")]
        order_id: String,
        status: String,
    },
    #[serde(rename = "error")]
    Error { message: String },
}
