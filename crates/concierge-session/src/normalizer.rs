//! Turns voice-service events and relay frames into canonical transcript
//! events.
//!
//! Two transports feed a session: the voice SDK's event stream and the
//! WebSocket relay. Both are reduced to [`TranscriptEvent`]s carrying a
//! sequence number drawn from one per-session counter, so arrival order is
//! total across transports. Interim SDK transcripts never become canonical
//! events; they only update the [`LiveCaption`] slot.
//!
//! Nothing here fails outward. Payloads that do not parse are logged and
//! dropped.

use chrono::{DateTime, Utc};
use concierge_types::frames::{ServerFrame, TranscriptFrame};
use concierge_types::{Role, TranscriptEvent};
use concierge_voice::{Speaker, TranscriptType, VoiceEvent, VoiceMessage};
use serde_json::Value;

/// The in-progress caption for an utterance that has not been finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveCaption {
    pub role: Role,
    pub text: String,
}

/// What a relay frame turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayInput {
    Transcript(TranscriptEvent),
    /// Summary text streamed by the server.
    AssistantResponse {
        call_id: String,
        text: String,
        is_final: bool,
    },
    OrderStatus {
        order_id: String,
        status: String,
    },
    Connected(String),
    ServerError(String),
}

#[derive(Debug, Default)]
pub struct EventNormalizer {
    last_sequence: u64,
    live_caption: Option<LiveCaption>,
}

fn role_of(speaker: Speaker) -> Role {
    match speaker {
        Speaker::Assistant => Role::Assistant,
        Speaker::User => Role::User,
    }
}

impl EventNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the caption and restarts sequence numbering for a new session.
    pub fn reset(&mut self) {
        self.last_sequence = 0;
        self.live_caption = None;
    }

    /// Continues numbering after `sequence`, used when a session's
    /// transcript is restored from a snapshot.
    pub fn resume_after(&mut self, sequence: u64) {
        self.last_sequence = self.last_sequence.max(sequence);
    }

    pub fn live_caption(&self) -> Option<&LiveCaption> {
        self.live_caption.as_ref()
    }

    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Normalizes an SDK event.
    ///
    /// Only final transcript messages yield an event. The returned event's
    /// utterance id is derived from its sequence so that the same line
    /// echoed back by the relay is recognized as a revision, not a new line.
    pub fn normalize_sdk(
        &mut self,
        call_id: &str,
        event: &VoiceEvent,
        at: DateTime<Utc>,
    ) -> Option<TranscriptEvent> {
        let VoiceEvent::Message(VoiceMessage::Transcript {
            role,
            transcript_type,
            transcript,
        }) = event
        else {
            return None;
        };
        let role = role_of(*role);

        match transcript_type {
            TranscriptType::Partial => {
                match &mut self.live_caption {
                    Some(caption) if caption.role == role => {
                        caption.text.clone_from(transcript);
                    }
                    slot => {
                        *slot = Some(LiveCaption {
                            role,
                            text: transcript.clone(),
                        });
                    }
                }
                None
            }
            TranscriptType::Final => {
                if self
                    .live_caption
                    .as_ref()
                    .is_some_and(|caption| caption.role == role)
                {
                    self.live_caption = None;
                }
                let sequence = self.next_sequence();
                Some(TranscriptEvent {
                    sequence,
                    call_id: call_id.to_string(),
                    role,
                    content: transcript.clone(),
                    is_final: true,
                    timestamp: at,
                    utterance_id: Some(sdk_utterance_id(call_id, sequence)),
                })
            }
        }
    }

    /// Parses an SDK event from its name and raw JSON payload.
    pub fn parse_sdk(name: &str, raw_payload: &str) -> Option<VoiceEvent> {
        let payload: Value = if raw_payload.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str(raw_payload) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(event = name, error = %e, "dropping malformed voice event payload");
                    return None;
                }
            }
        };
        let event = VoiceEvent::from_sdk(name, &payload);
        if event.is_none() {
            tracing::warn!(event = name, "dropping unrecognized voice event");
        }
        event
    }

    /// Normalizes a relay frame received as text.
    pub fn normalize_frame(&mut self, raw: &str, at: DateTime<Utc>) -> Option<RelayInput> {
        let frame: ServerFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed relay frame");
                return None;
            }
        };

        let input = match frame {
            ServerFrame::Transcript(b) => self.frame_event(b.line, false, at),
            ServerFrame::FinalTranscript(b) => self.frame_event(b.line, true, at),
            ServerFrame::AssistantResponse {
                call_id,
                assistant_reply_text,
                is_final,
                ..
            } => RelayInput::AssistantResponse {
                call_id,
                text: assistant_reply_text,
                is_final,
            },
            ServerFrame::OrderStatusUpdate { order_id, status } => {
                RelayInput::OrderStatus { order_id, status }
            }
            ServerFrame::Connected { message } => RelayInput::Connected(message),
            ServerFrame::Error { message } => RelayInput::ServerError(message),
        };
        Some(input)
    }

    fn frame_event(&mut self, line: TranscriptFrame, is_final: bool, at: DateTime<Utc>) -> RelayInput {
        let utterance_id = line.revision_key().map(str::to_string);
        RelayInput::Transcript(TranscriptEvent {
            sequence: self.next_sequence(),
            call_id: line.call_id,
            role: line.role,
            content: line.content,
            is_final,
            timestamp: at,
            utterance_id,
        })
    }
}

/// Utterance id given to SDK transcripts when they are forwarded to the relay.
pub fn sdk_utterance_id(call_id: &str, sequence: u64) -> String {
    format!("{call_id}:{sequence}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sdk_transcript(role: Speaker, kind: TranscriptType, text: &str) -> VoiceEvent {
        VoiceEvent::Message(VoiceMessage::Transcript {
            role,
            transcript_type: kind,
            transcript: text.to_string(),
        })
    }

    #[test]
    fn only_final_sdk_transcripts_become_events() {
        let mut n = EventNormalizer::new();
        let now = Utc::now();

        assert!(n
            .normalize_sdk("c1", &sdk_transcript(Speaker::User, TranscriptType::Partial, "I'd"), now)
            .is_none());
        assert!(n.normalize_sdk("c1", &VoiceEvent::SpeechStart, now).is_none());

        let event = n
            .normalize_sdk("c1", &sdk_transcript(Speaker::User, TranscriptType::Final, "I'd like tea"), now)
            .unwrap();
        assert_eq!(event.sequence, 1);
        assert!(event.is_final);
        assert_eq!(event.role, Role::User);
        assert_eq!(event.utterance_id.as_deref(), Some("c1:1"));
    }

    #[test]
    fn live_caption_is_overwritten_then_cleared() {
        let mut n = EventNormalizer::new();
        let now = Utc::now();
        n.normalize_sdk("c1", &sdk_transcript(Speaker::User, TranscriptType::Partial, "I"), now);
        n.normalize_sdk("c1", &sdk_transcript(Speaker::User, TranscriptType::Partial, "I want"), now);
        assert_eq!(
            n.live_caption(),
            Some(&LiveCaption {
                role: Role::User,
                text: "I want".to_string()
            })
        );

        // A final from the other speaker leaves the caption alone.
        n.normalize_sdk("c1", &sdk_transcript(Speaker::Assistant, TranscriptType::Final, "Yes?"), now);
        assert!(n.live_caption().is_some());

        n.normalize_sdk("c1", &sdk_transcript(Speaker::User, TranscriptType::Final, "I want tea"), now);
        assert!(n.live_caption().is_none());
    }

    #[test]
    fn sequences_are_shared_across_transports() {
        let mut n = EventNormalizer::new();
        let now = Utc::now();
        let a = n
            .normalize_sdk("c1", &sdk_transcript(Speaker::Assistant, TranscriptType::Final, "Hi"), now)
            .unwrap();
        let frame = json!({
            "type": "transcript",
            "callId": "c1",
            "role": "user",
            "content": "hel",
            "utteranceId": "u9",
            "isFinal": false,
            "timestamp": now,
        })
        .to_string();
        let Some(RelayInput::Transcript(b)) = n.normalize_frame(&frame, now) else {
            panic!("expected transcript");
        };
        assert!(b.sequence > a.sequence);
        assert!(!b.is_final);
        assert_eq!(b.utterance_id.as_deref(), Some("u9"));
    }

    #[test]
    fn segment_id_is_used_when_utterance_id_is_absent() {
        let mut n = EventNormalizer::new();
        let now = Utc::now();
        let frame = json!({
            "type": "transcript(final)",
            "callId": "c1",
            "role": "assistant",
            "content": "Done",
            "segmentId": "s1",
            "isFinal": true,
            "timestamp": now,
        })
        .to_string();
        let Some(RelayInput::Transcript(event)) = n.normalize_frame(&frame, now) else {
            panic!("expected transcript");
        };
        assert!(event.is_final);
        assert_eq!(event.utterance_id.as_deref(), Some("s1"));
    }

    #[test]
    fn malformed_input_is_dropped() {
        let mut n = EventNormalizer::new();
        assert!(n.normalize_frame("{oops", Utc::now()).is_none());
        assert!(n.normalize_frame(r#"{"type":"mystery"}"#, Utc::now()).is_none());
        assert!(EventNormalizer::parse_sdk("message", "not json").is_none());
        assert!(EventNormalizer::parse_sdk("bogus-event", "{}").is_none());
        assert_eq!(
            EventNormalizer::parse_sdk("call-start", ""),
            Some(VoiceEvent::CallStart)
        );
    }

    #[test]
    fn assistant_response_frames_pass_through() {
        let mut n = EventNormalizer::new();
        let frame = json!({
            "type": "assistantResponse",
            "callId": "c1",
            "assistant_reply_text": "Room 204",
            "isFinal": false,
            "timestamp": Utc::now(),
        })
        .to_string();
        assert_eq!(
            n.normalize_frame(&frame, Utc::now()),
            Some(RelayInput::AssistantResponse {
                call_id: "c1".to_string(),
                text: "Room 204".to_string(),
                is_final: false,
            })
        );
    }
}
