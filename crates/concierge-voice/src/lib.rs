//! Voice-service boundary for the concierge platform.
//!
//! The hosted voice assistant places the call, streams transcripts and
//! reports call status. This crate defines that boundary: the
//! [`VoiceClient`] trait the session engine drives, the [`VoiceEvent`]
//! model for what the service reports back, the service configuration, and
//! a [`SimulatedVoiceClient`] for running without the hosted service.

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod simulated;

pub use client::{AssistantOverrides, CallHandle, VoiceClient};
pub use config::VoiceConfig;
pub use error::VoiceError;
pub use event::{Speaker, TranscriptType, VoiceEvent, VoiceMessage};
pub use simulated::{SimulatedVoiceClient, StartBehavior};
