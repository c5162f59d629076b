//! Events emitted by the voice service during a call.

use serde::Deserialize;
use serde_json::Value;

/// Speaker label attached to SDK transcript messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Assistant,
    User,
}

/// Finality of an SDK transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptType {
    Partial,
    Final,
}

/// Payload of a `message` event, discriminated by its `type` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum VoiceMessage {
    #[serde(rename = "transcript")]
    Transcript {
        role: Speaker,
        #[serde(rename = "transcriptType")]
        transcript_type: TranscriptType,
        transcript: String,
    },
    #[serde(rename = "end_of_call_report", alias = "end-of-call-report")]
    EndOfCallReport {
        #[serde(default)]
        summary: Option<String>,
    },
    #[serde(rename = "status-update")]
    StatusUpdate {
        status: String,
        #[serde(default, rename = "endedReason")]
        ended_reason: Option<String>,
    },
    /// Message kinds the session engine does not act on.
    #[serde(other)]
    Other,
}

impl VoiceMessage {
    /// Parses a raw `message` payload.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// One event from the voice service.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    SpeechStart,
    SpeechEnd,
    CallStart,
    CallEnd,
    /// Microphone level, nominally `0.0..=1.0`.
    VolumeLevel(f32),
    Message(VoiceMessage),
    Error(String),
}

impl VoiceEvent {
    /// Builds an event from the SDK's event name and JSON payload.
    ///
    /// Returns `None` for unknown event names and payloads that do not fit
    /// the named event.
    pub fn from_sdk(name: &str, payload: &Value) -> Option<Self> {
        match name {
            "speech-start" => Some(Self::SpeechStart),
            "speech-end" => Some(Self::SpeechEnd),
            "call-start" => Some(Self::CallStart),
            "call-end" => Some(Self::CallEnd),
            "volume-level" => payload.as_f64().map(|level| Self::VolumeLevel(level as f32)),
            "message" => VoiceMessage::deserialize(payload).ok().map(Self::Message),
            "error" => {
                let text = payload
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| payload.as_str().map(str::to_string))
                    .unwrap_or_else(|| payload.to_string());
                Some(Self::Error(text))
            }
            _ => None,
        }
    }
}
