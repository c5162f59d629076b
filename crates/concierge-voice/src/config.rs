use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::VoiceError;

fn default_start_timeout_secs() -> u64 {
    15
}

/// Settings for the hosted voice assistant.
#[derive(Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Public (browser-safe) key for the voice service.
    #[serde(skip_serializing)]
    pub public_key: String,
    /// Assistant to dial when a call starts.
    pub assistant_id: String,
    /// How long to wait for the call-start acknowledgment. Default: 15.
    #[serde(default = "default_start_timeout_secs")]
    pub start_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            public_key: String::new(),
            assistant_id: String::new(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }
}

impl fmt::Debug for VoiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceConfig")
            .field("public_key", &"[REDACTED]")
            .field("assistant_id", &self.assistant_id)
            .field("start_timeout_secs", &self.start_timeout_secs)
            .finish()
    }
}

impl VoiceConfig {
    pub fn new(public_key: impl Into<String>, assistant_id: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            assistant_id: assistant_id.into(),
            start_timeout_secs: default_start_timeout_secs(),
        }
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    /// Checks that both the key and the assistant id are set.
    pub fn validate(&self) -> Result<(), VoiceError> {
        if self.public_key.trim().is_empty() {
            return Err(VoiceError::Config("public_key is not set".to_string()));
        }
        if self.assistant_id.trim().is_empty() {
            return Err(VoiceError::Config("assistant_id is not set".to_string()));
        }
        if self.start_timeout_secs == 0 {
            return Err(VoiceError::Config(
                "start_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_public_key() {
        let config = VoiceConfig::new("pk_live_secret", "assistant-1");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("pk_live_secret"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("assistant-1"));
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(VoiceConfig::default().validate().is_err());
        assert!(VoiceConfig::new("pk", "").validate().is_err());
        assert!(VoiceConfig::new("pk", "assistant").validate().is_ok());
    }
}
