use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("failed to start call: {0}")]
    Start(String),

    #[error("no call in progress")]
    NotConnected,

    #[error("audio device error: {0}")]
    Device(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
