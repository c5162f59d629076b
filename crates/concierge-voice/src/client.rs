//! The call-control surface the session engine drives.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::error::VoiceError;
use crate::event::VoiceEvent;

/// Per-call assistant overrides passed to [`VoiceClient::start`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssistantOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub variable_values: HashMap<String, String>,
}

/// Acknowledgment returned once the voice service has accepted a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHandle {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub web_call_url: Option<String>,
}

/// A connection to the hosted voice assistant.
///
/// One client is constructed per process and handed to the session engine,
/// which owns the call lifecycle. Events are delivered over a broadcast
/// channel obtained from [`VoiceClient::subscribe`].
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Places a call to `assistant_id`. Resolves once the call is accepted.
    async fn start(
        &self,
        assistant_id: &str,
        overrides: Option<AssistantOverrides>,
    ) -> Result<CallHandle, VoiceError>;

    /// Hangs up the current call.
    async fn stop(&self) -> Result<(), VoiceError>;

    /// Mutes or unmutes the local microphone.
    async fn set_muted(&self, muted: bool) -> Result<(), VoiceError>;

    fn is_muted(&self) -> bool;

    /// Makes the assistant speak `text`, optionally ending the call after.
    async fn say(&self, text: &str, end_call_after_spoken: bool) -> Result<(), VoiceError>;

    fn subscribe(&self) -> broadcast::Receiver<VoiceEvent>;
}
