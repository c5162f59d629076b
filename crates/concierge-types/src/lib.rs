//! Shared types and constants for the concierge workspace.
//!
//! This crate provides the domain vocabulary used by every other crate:
//! transcript events, call summaries, order summaries, service requests and
//! active orders, plus the fixed user-facing messages the session engine
//! installs on its fallback paths.
//!
//! Staff order records ([`Order`], [`CreateOrderParams`]) are defined here
//! rather than in the store, since the session engine files orders over
//! HTTP and never opens the database.
//!
//! All wire-facing types serialize with camelCase field names so that the
//! relay frames, HTTP bodies and persisted local state share one shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod frames;
mod order;
mod request;

pub use order::{CreateOrderParams, DeliveryTime, Order, OrderItem, OrderSummary};
pub use request::{ActiveOrder, ServiceRequest, ServiceRequestDetails, ACTIVE_ORDER_WINDOW_SECS};

/// Fixed summary content installed when a call has too few transcript
/// entries to be worth summarizing.
pub const SUMMARY_TOO_SHORT: &str =
    "Call was too short to generate a summary. Please try a more detailed conversation.";

/// Placeholder content shown while a summary is being generated.
pub const SUMMARY_GENERATING: &str = "Generating AI summary of your conversation...";

/// Fallback content installed when summary generation fails.
pub const SUMMARY_FAILED: &str =
    "Summary could not be generated. Please review the conversation transcript.";

/// Content used when the voice service reports an end-of-call summary
/// without any text.
pub const SUMMARY_NOT_PROVIDED: &str =
    "No summary was provided by the assistant for this conversation.";

/// Message returned when a summary translation cannot be produced.
pub const TRANSLATION_FAILED: &str =
    "Không thể dịch nội dung này sang tiếng Việt. Vui lòng thử lại sau.";

/// Speaker of a transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The voice assistant.
    Assistant,
    /// The hotel guest.
    User,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Assistant => "assistant",
            Self::User => "user",
        }
    }

    /// Parses a wire label. Unknown labels yield `None`.
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "assistant" => Some(Self::Assistant),
            "user" => Some(Self::User),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A canonical transcript event.
///
/// `sequence` is assigned by the normalizer and is strictly increasing
/// within one session. Events with `is_final == false` may be superseded by
/// a later event carrying the same `utterance_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub sequence: u64,
    pub call_id: String,
    pub role: Role,
    pub content: String,
    pub is_final: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utterance_id: Option<String>,
}

/// The summary attached to a completed call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSummary {
    pub id: String,
    pub call_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// `true` while the content is the generation placeholder.
    #[serde(default)]
    pub generating: bool,
}

impl CallSummary {
    /// Builds a summary with final (non-placeholder) content.
    pub fn new(call_id: impl Into<String>, content: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: at.timestamp_millis().to_string(),
            call_id: call_id.into(),
            content: content.into(),
            timestamp: at,
            generating: false,
        }
    }

    /// Builds the "generating" placeholder for `call_id`.
    pub fn placeholder(call_id: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            generating: true,
            ..Self::new(call_id, SUMMARY_GENERATING, at)
        }
    }
}

/// A role/content pair as sent to the summary generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub role: Role,
    pub content: String,
}

impl From<&TranscriptEvent> for TranscriptLine {
    fn from(event: &TranscriptEvent) -> Self {
        Self {
            role: event.role,
            content: event.content.clone(),
        }
    }
}

/// Formats a duration in seconds as `mm:ss` for display.
pub fn format_duration(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Formats a duration in seconds as `m:ss`, the form the summary endpoint
/// stores alongside a call.
pub fn format_call_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_labels_round_trip() {
        for role in [Role::Assistant, Role::User] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("system"), None);
    }

    #[test]
    fn transcript_event_uses_camel_case() {
        let event = TranscriptEvent {
            sequence: 3,
            call_id: "call-1".to_string(),
            role: Role::User,
            content: "hello".to_string(),
            is_final: true,
            timestamp: Utc::now(),
            utterance_id: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["callId"], "call-1");
        assert_eq!(json["isFinal"], true);
        assert_eq!(json["role"], "user");
        assert!(json.get("utteranceId").is_none());
    }

    #[test]
    fn placeholder_summary_is_marked_generating() {
        let summary = CallSummary::placeholder("call-9", Utc::now());
        assert!(summary.generating);
        assert_eq!(summary.content, SUMMARY_GENERATING);
        assert_eq!(summary.call_id, "call-9");
    }

    #[test]
    fn duration_formats() {
        assert_eq!(format_duration(0), "00:00");
        assert_eq!(format_duration(75), "01:15");
        assert_eq!(format_call_duration(75), "1:15");
        assert_eq!(format_call_duration(600), "10:00");
    }
}
