//! An in-process voice client that plays back scripted behavior.
//!
//! Used for local development without a voice-service account and by the
//! session engine's tests. Events are pushed with [`SimulatedVoiceClient::emit`].

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::client::{AssistantOverrides, CallHandle, VoiceClient};
use crate::error::VoiceError;
use crate::event::VoiceEvent;

/// Default capacity for the event broadcast channel.
const DEFAULT_EVENT_BROADCAST_CAPACITY: usize = 256;

/// How [`SimulatedVoiceClient::start`] responds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartBehavior {
    Accept,
    Reject(String),
    /// Never acknowledges, so callers hit their timeout.
    Hang,
}

#[derive(Debug)]
pub struct SimulatedVoiceClient {
    start_behavior: Mutex<StartBehavior>,
    fail_mute: AtomicBool,
    muted: AtomicBool,
    connected: AtomicBool,
    calls_started: AtomicU64,
    stops: AtomicU64,
    spoken: Mutex<Vec<(String, bool)>>,
    events_tx: broadcast::Sender<VoiceEvent>,
}

impl Default for SimulatedVoiceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedVoiceClient {
    pub fn new() -> Self {
        let (events_tx, _) = broadcast::channel(DEFAULT_EVENT_BROADCAST_CAPACITY);
        Self {
            start_behavior: Mutex::new(StartBehavior::Accept),
            fail_mute: AtomicBool::new(false),
            muted: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            calls_started: AtomicU64::new(0),
            stops: AtomicU64::new(0),
            spoken: Mutex::new(Vec::new()),
            events_tx,
        }
    }

    pub fn set_start_behavior(&self, behavior: StartBehavior) {
        *self.start_behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Makes subsequent `set_muted` calls fail.
    pub fn set_fail_mute(&self, fail: bool) {
        self.fail_mute.store(fail, Ordering::SeqCst);
    }

    /// Delivers an event to all subscribers.
    pub fn emit(&self, event: VoiceEvent) {
        // No subscribers is fine.
        let _ = self.events_tx.send(event);
    }

    pub fn calls_started(&self) -> u64 {
        self.calls_started.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u64 {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Everything passed to `say`, in order.
    pub fn spoken(&self) -> Vec<(String, bool)> {
        self.spoken.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl VoiceClient for SimulatedVoiceClient {
    async fn start(
        &self,
        assistant_id: &str,
        _overrides: Option<AssistantOverrides>,
    ) -> Result<CallHandle, VoiceError> {
        let behavior = self
            .start_behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        match behavior {
            StartBehavior::Accept => {
                let n = self.calls_started.fetch_add(1, Ordering::SeqCst) + 1;
                self.connected.store(true, Ordering::SeqCst);
                self.muted.store(false, Ordering::SeqCst);
                info!(assistant_id, call = n, "simulated call started");
                self.emit(VoiceEvent::CallStart);
                Ok(CallHandle {
                    id: format!("sim-call-{n}"),
                    status: Some("in-progress".to_string()),
                    web_call_url: None,
                })
            }
            StartBehavior::Reject(reason) => Err(VoiceError::Start(reason)),
            StartBehavior::Hang => std::future::pending().await,
        }
    }

    async fn stop(&self) -> Result<(), VoiceError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            self.emit(VoiceEvent::CallEnd);
        }
        Ok(())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), VoiceError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoiceError::NotConnected);
        }
        if self.fail_mute.load(Ordering::SeqCst) {
            return Err(VoiceError::Device("microphone unavailable".to_string()));
        }
        self.muted.store(muted, Ordering::SeqCst);
        Ok(())
    }

    fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    async fn say(&self, text: &str, end_call_after_spoken: bool) -> Result<(), VoiceError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(VoiceError::NotConnected);
        }
        self.spoken
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((text.to_string(), end_call_after_spoken));
        if end_call_after_spoken {
            self.connected.store(false, Ordering::SeqCst);
            self.emit(VoiceEvent::CallEnd);
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events_tx.subscribe()
    }
}
