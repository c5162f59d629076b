use std::time::Duration;

use concierge_voice::{AssistantOverrides, VoiceConfig};

/// Fewest transcript entries worth sending for summarization.
pub const MIN_TRANSCRIPTS_FOR_SUMMARY: usize = 2;

/// Tunables for a [`SessionMachine`](crate::SessionMachine).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Assistant dialed on `start_call`.
    pub assistant_id: String,
    /// Per-call assistant overrides.
    pub overrides: Option<AssistantOverrides>,
    /// Bound on waiting for the call-start acknowledgment.
    pub start_timeout: Duration,
    pub min_transcripts_for_summary: usize,
    /// Ask the backend for its deterministic summary instead of a generated one.
    pub force_basic_summary: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            assistant_id: String::new(),
            overrides: None,
            start_timeout: Duration::from_secs(15),
            min_transcripts_for_summary: MIN_TRANSCRIPTS_FOR_SUMMARY,
            force_basic_summary: false,
        }
    }
}

impl SessionConfig {
    pub fn from_voice(voice: &VoiceConfig) -> Self {
        Self {
            assistant_id: voice.assistant_id.clone(),
            start_timeout: voice.start_timeout(),
            ..Self::default()
        }
    }
}
