//! The call-session state machine.
//!
//! A [`SessionMachine`] owns everything derived from the current call: the
//! transcript ledger, the order and call summaries, service requests, the
//! translation and the email flag. Every mutation goes through `&mut self`,
//! so inputs from the voice service, the relay and summary generation are
//! applied one at a time in the order [`SessionMachine::process_next`]
//! receives them.
//!
//! ```text
//! Idle ──start──▶ Connecting ──ack──▶ Active ──end──▶ Summarizing ──resolve──▶ Completed
//!                     │                  │
//!                     └──timeout/error───┴──error──▶ Failed
//! ```
//!
//! `start` is accepted from `Idle`, `Completed`, `Failed` and `Summarizing`.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use concierge_store::LocalStore;
use concierge_types::{
    format_call_duration, ActiveOrder, CallSummary, CreateOrderParams, DeliveryTime, Order,
    OrderSummary, ServiceRequest, TranscriptEvent, TRANSLATION_FAILED,
};
use concierge_voice::{VoiceClient, VoiceEvent, VoiceMessage};
use serde::Serialize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::active_orders::ActiveOrderTracker;
use crate::backend::{ConciergeApi, SummaryRequest};
use crate::checkpoint::{Checkpoint, CheckpointStore, SessionSnapshot};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::ledger::TranscriptLedger;
use crate::normalizer::{EventNormalizer, LiveCaption, RelayInput};
use crate::reconcile::{self, SummaryResolution};
use crate::relay::RelayClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Connecting,
    Active,
    Summarizing,
    Completed,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Summarizing => "summarizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A point-in-time view of the call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub id: Option<String>,
    pub state: SessionState,
    pub started_at: Option<DateTime<Utc>>,
    /// Seconds, per [`display_duration`].
    pub duration: u64,
    pub muted: bool,
    pub mic_level: f32,
}

/// Duration shown to the user: the voice service's count once it is
/// non-zero, the local backup count until then.
pub fn display_duration(reported: u64, local: u64) -> u64 {
    if reported > 0 {
        reported
    } else {
        local
    }
}

/// One-second counter running on its own task.
#[derive(Default)]
struct DurationTimer {
    seconds: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl DurationTimer {
    fn start(&mut self) {
        self.stop();
        self.seconds.store(0, Ordering::Relaxed);
        let seconds = Arc::clone(&self.seconds);
        self.handle = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.tick().await;
            loop {
                interval.tick().await;
                seconds.fetch_add(1, Ordering::Relaxed);
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    fn reset(&mut self) {
        self.stop();
        self.seconds.store(0, Ordering::Relaxed);
    }

    fn seconds(&self) -> u64 {
        self.seconds.load(Ordering::Relaxed)
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn estimated_time(delivery: DeliveryTime) -> &'static str {
    match delivery {
        DeliveryTime::Asap => "15-20 minutes",
        DeliveryTime::ThirtyMinutes => "30 minutes",
        DeliveryTime::OneHour => "1 hour",
        DeliveryTime::Specific => "At the requested time",
    }
}

pub struct SessionMachine {
    config: SessionConfig,
    voice: Arc<dyn VoiceClient>,
    events: broadcast::Receiver<VoiceEvent>,
    api: Arc<dyn ConciergeApi>,
    relay: Option<RelayClient>,

    state: SessionState,
    call_id: Option<String>,
    started_at: Option<DateTime<Utc>>,
    muted: bool,
    mic_level: f32,
    assistant_speaking: bool,
    last_error: Option<String>,
    reported_timer: DurationTimer,
    local_timer: DurationTimer,

    normalizer: EventNormalizer,
    ledger: TranscriptLedger,
    order_summary: Option<OrderSummary>,
    call_summary: Option<CallSummary>,
    service_requests: Vec<ServiceRequest>,
    translated_summary: Option<String>,
    email_sent_for_current_session: bool,
    request_received_at: Option<DateTime<Utc>>,
    summary_preview: String,
    order_statuses: HashMap<String, String>,

    resolution_tx: mpsc::Sender<SummaryResolution>,
    resolution_rx: mpsc::Receiver<SummaryResolution>,
    summary_task: Option<JoinHandle<()>>,

    checkpoints: CheckpointStore,
    active_orders: ActiveOrderTracker,
}

enum Input {
    Voice(Result<VoiceEvent, RecvError>),
    Relay(Option<String>),
    Resolution(Option<SummaryResolution>),
}

async fn next_relay_frame(relay: &mut Option<RelayClient>) -> Option<String> {
    match relay {
        Some(relay) => relay.recv().await,
        None => std::future::pending().await,
    }
}

impl SessionMachine {
    /// Builds an idle machine, loading checkpoints and active orders from
    /// `store`.
    pub async fn new(
        config: SessionConfig,
        voice: Arc<dyn VoiceClient>,
        api: Arc<dyn ConciergeApi>,
        store: Arc<dyn LocalStore>,
    ) -> Self {
        let events = voice.subscribe();
        let (resolution_tx, resolution_rx) = mpsc::channel(8);
        let checkpoints = CheckpointStore::load(Arc::clone(&store)).await;
        let active_orders = ActiveOrderTracker::load(store).await;
        Self {
            config,
            voice,
            events,
            api,
            relay: None,
            state: SessionState::Idle,
            call_id: None,
            started_at: None,
            muted: false,
            mic_level: 0.0,
            assistant_speaking: false,
            last_error: None,
            reported_timer: DurationTimer::default(),
            local_timer: DurationTimer::default(),
            normalizer: EventNormalizer::new(),
            ledger: TranscriptLedger::new(),
            order_summary: None,
            call_summary: None,
            service_requests: Vec::new(),
            translated_summary: None,
            email_sent_for_current_session: false,
            request_received_at: None,
            summary_preview: String::new(),
            order_statuses: HashMap::new(),
            resolution_tx,
            resolution_rx,
            summary_task: None,
            checkpoints,
            active_orders,
        }
    }

    // -----------------------------------------------------------------------
    // Call lifecycle
    // -----------------------------------------------------------------------

    /// Places a call and waits, up to the configured timeout, for the voice
    /// service to accept it. Returns the call id.
    ///
    /// Starting while a summary is pending abandons it: the request keeps
    /// running so the backend still stores it, and its result is discarded
    /// when it arrives because it carries the previous call id.
    pub async fn start_call(&mut self) -> Result<String, SessionError> {
        match self.state {
            SessionState::Idle | SessionState::Completed | SessionState::Failed => {}
            SessionState::Summarizing => {
                info!(call_id = ?self.call_id, "new call started; abandoning the pending summary");
                // Dropping the handle detaches the task.
                self.summary_task = None;
            }
            state => {
                return Err(SessionError::InvalidState {
                    action: "start a call",
                    state,
                })
            }
        }

        self.clear_call_state();
        self.request_received_at = Some(Utc::now());
        // Events still queued from an earlier call belong to that call.
        self.events = self.events.resubscribe();
        self.state = SessionState::Connecting;
        info!(assistant_id = %self.config.assistant_id, "starting call");

        let start = self
            .voice
            .start(&self.config.assistant_id, self.config.overrides.clone());
        match tokio::time::timeout(self.config.start_timeout, start).await {
            Ok(Ok(handle)) => {
                info!(call_id = %handle.id, "call accepted");
                self.call_id = Some(handle.id.clone());
                self.started_at = Some(Utc::now());
                self.state = SessionState::Active;
                self.local_timer.start();
                Ok(handle.id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "voice service rejected the call");
                self.state = SessionState::Failed;
                self.last_error = Some(format!("Could not start the call: {e}"));
                Err(e.into())
            }
            Err(_) => {
                warn!(timeout = ?self.config.start_timeout, "call start was not acknowledged");
                if let Err(e) = self.voice.stop().await {
                    debug!(error = %e, "stop after start timeout failed");
                }
                self.state = SessionState::Failed;
                self.last_error = Some(
                    "The voice assistant did not respond. Please try again.".to_string(),
                );
                Err(SessionError::StartTimedOut(self.config.start_timeout))
            }
        }
    }

    /// Hangs up and starts summarization.
    pub async fn end_call(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState {
                action: "end the call",
                state: self.state,
            });
        }
        if let Err(e) = self.voice.stop().await {
            warn!(error = %e, "voice service stop failed; ending the session anyway");
        }
        self.finish_call();
        Ok(())
    }

    /// Moves an active call to `Summarizing` (or straight to `Completed` for
    /// a too-short transcript) and requests the summary.
    fn finish_call(&mut self) {
        let Some(call_id) = self.call_id.clone() else {
            return;
        };
        self.reported_timer.stop();
        self.local_timer.stop();
        self.ledger.freeze();
        self.assistant_speaking = false;
        if self.order_summary.is_none() {
            self.order_summary = Some(OrderSummary::default_template());
        }
        let now = Utc::now();
        let duration = self.duration_secs();

        if self.ledger.len() < self.config.min_transcripts_for_summary {
            info!(call_id = %call_id, entries = self.ledger.len(), "call too short to summarize");
            self.call_summary = Some(reconcile::too_short(&call_id, now));
            self.state = SessionState::Completed;
            return;
        }

        self.call_summary = Some(CallSummary::placeholder(&call_id, now));
        self.summary_preview.clear();
        self.state = SessionState::Summarizing;

        let request = SummaryRequest {
            call_id: call_id.clone(),
            transcripts: self.ledger.lines(),
            call_duration: format_call_duration(duration),
            force_basic_summary: self.config.force_basic_summary,
        };
        info!(call_id = %call_id, entries = request.transcripts.len(), "requesting summary");
        let api = Arc::clone(&self.api);
        let tx = self.resolution_tx.clone();
        self.summary_task = Some(tokio::spawn(async move {
            let outcome = reconcile::generate(api.as_ref(), &request).await;
            let _ = tx.send(SummaryResolution { call_id, outcome }).await;
        }));
    }

    /// Applies a summary outcome if it belongs to the call being summarized.
    ///
    /// Returns `false` when the outcome was discarded as superseded.
    pub fn apply_resolution(&mut self, resolution: SummaryResolution) -> bool {
        if self.state != SessionState::Summarizing
            || self.call_id.as_deref() != Some(resolution.call_id.as_str())
        {
            debug!(call_id = %resolution.call_id, "discarding superseded summary");
            return false;
        }
        let reconciled = reconcile::reconcile(
            &resolution.call_id,
            resolution.outcome,
            self.order_summary.as_ref(),
            Utc::now(),
        );
        self.call_summary = Some(reconciled.call_summary);
        if let Some(order) = reconciled.order_summary {
            self.order_summary = Some(order);
        }
        if let Some(requests) = reconciled.service_requests {
            self.service_requests = requests;
        }
        self.state = SessionState::Completed;
        info!(call_id = %resolution.call_id, "call completed");
        true
    }

    /// Waits for the pending summary of the current call, if any.
    pub async fn await_resolution(&mut self) -> bool {
        while self.state == SessionState::Summarizing {
            match self.resolution_rx.recv().await {
                Some(resolution) => {
                    if self.apply_resolution(resolution) {
                        return true;
                    }
                }
                None => break,
            }
        }
        false
    }

    /// Requests or clears mute. The flag changes only after the voice
    /// service confirms.
    pub async fn toggle_mute(&mut self) -> Result<bool, SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState {
                action: "toggle mute",
                state: self.state,
            });
        }
        let target = !self.muted;
        match self.voice.set_muted(target).await {
            Ok(()) => {
                self.muted = target;
                Ok(target)
            }
            Err(e) => {
                let verb = if target { "mute" } else { "unmute" };
                warn!(error = %e, "could not {verb} microphone");
                self.last_error = Some(format!("Could not {verb} the microphone: {e}"));
                Err(e.into())
            }
        }
    }

    /// Has the assistant speak `text`.
    pub async fn say(&mut self, text: &str, end_call_after_spoken: bool) -> Result<(), SessionError> {
        if self.state != SessionState::Active {
            return Err(SessionError::InvalidState {
                action: "speak",
                state: self.state,
            });
        }
        self.voice.say(text, end_call_after_spoken).await.map_err(|e| {
            self.last_error = Some(format!("The assistant could not speak: {e}"));
            e.into()
        })
    }

    // -----------------------------------------------------------------------
    // Inputs
    // -----------------------------------------------------------------------

    /// Waits for the next input from any source and applies it.
    pub async fn process_next(&mut self) {
        let input = tokio::select! {
            event = self.events.recv() => Input::Voice(event),
            frame = next_relay_frame(&mut self.relay) => Input::Relay(frame),
            resolution = self.resolution_rx.recv() => Input::Resolution(resolution),
        };
        match input {
            Input::Voice(Ok(event)) => self.handle_voice_event(event).await,
            Input::Voice(Err(RecvError::Lagged(skipped))) => {
                warn!(skipped, "voice events dropped by a slow session");
            }
            Input::Voice(Err(RecvError::Closed)) => {
                warn!("voice event stream closed");
            }
            Input::Relay(Some(raw)) => self.handle_relay_frame(&raw),
            Input::Relay(None) => {
                warn!("relay connection lost");
                self.relay = None;
                self.last_error = Some("Lost connection to the transcript relay.".to_string());
            }
            Input::Resolution(Some(resolution)) => {
                self.apply_resolution(resolution);
            }
            Input::Resolution(None) => {}
        }
    }

    /// Applies every voice event already queued.
    pub async fn drain_voice_events(&mut self) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_voice_event(event).await,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "voice events dropped by a slow session");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub async fn handle_voice_event(&mut self, event: VoiceEvent) {
        match &event {
            VoiceEvent::SpeechStart => self.assistant_speaking = true,
            VoiceEvent::SpeechEnd => self.assistant_speaking = false,
            VoiceEvent::CallStart => {
                if self.state == SessionState::Active {
                    self.reported_timer.start();
                }
            }
            VoiceEvent::CallEnd => {
                if self.state == SessionState::Active {
                    info!(call_id = ?self.call_id, "voice service ended the call");
                    self.finish_call();
                }
            }
            VoiceEvent::VolumeLevel(level) => {
                self.mic_level = if level.is_finite() {
                    level.clamp(0.0, 1.0)
                } else {
                    0.0
                };
            }
            VoiceEvent::Message(VoiceMessage::Transcript { .. }) => {
                self.handle_sdk_transcript(&event).await;
            }
            VoiceEvent::Message(VoiceMessage::EndOfCallReport { summary }) => {
                self.handle_end_of_call_report(summary.as_deref());
            }
            VoiceEvent::Message(VoiceMessage::StatusUpdate {
                status,
                ended_reason,
            }) => {
                if status == "ended" {
                    info!(call_id = ?self.call_id, ended_reason = ?ended_reason, "voice service reported call ended");
                } else {
                    debug!(status = %status, "voice status update");
                }
            }
            VoiceEvent::Message(VoiceMessage::Other) => {}
            VoiceEvent::Error(message) => {
                warn!(error = %message, "voice service error");
                self.last_error = Some(message.clone());
                if matches!(self.state, SessionState::Connecting | SessionState::Active) {
                    self.reported_timer.stop();
                    self.local_timer.stop();
                    self.ledger.freeze();
                    self.state = SessionState::Failed;
                }
            }
        }
    }

    async fn handle_sdk_transcript(&mut self, event: &VoiceEvent) {
        let Some(call_id) = self.call_id.clone() else {
            return;
        };
        let Some(transcript) = self.normalizer.normalize_sdk(&call_id, event, Utc::now()) else {
            return;
        };
        let outcome = self.ledger.append(transcript.clone());
        if outcome.changed() && self.state == SessionState::Active {
            if let Some(relay) = &self.relay {
                if let Err(e) = relay.send_transcript(&transcript).await {
                    warn!(error = %e, "failed to forward transcript to relay");
                }
            }
        }
    }

    fn handle_end_of_call_report(&mut self, summary: Option<&str>) {
        let Some(call_id) = self.call_id.clone() else {
            return;
        };
        let (order, report_summary) =
            reconcile::reconcile_report(&call_id, summary, self.order_summary.as_ref(), Utc::now());
        if let Some(order) = order {
            self.order_summary = Some(order);
        }
        if self.call_summary.is_none() {
            self.call_summary = Some(report_summary);
        }
    }

    /// Applies a raw relay frame.
    pub fn handle_relay_frame(&mut self, raw: &str) {
        let Some(input) = self.normalizer.normalize_frame(raw, Utc::now()) else {
            return;
        };
        let current = self.call_id.as_deref();
        match input {
            RelayInput::Transcript(event) => {
                if current != Some(event.call_id.as_str()) {
                    debug!(call_id = %event.call_id, "ignoring transcript for another call");
                    return;
                }
                let outcome = self.ledger.append(event);
                debug!(?outcome, "relay transcript");
            }
            RelayInput::AssistantResponse {
                call_id,
                text,
                is_final,
            } => {
                if current != Some(call_id.as_str()) || self.state != SessionState::Summarizing {
                    return;
                }
                if is_final {
                    self.summary_preview = text;
                } else {
                    self.summary_preview.push_str(&text);
                }
            }
            RelayInput::OrderStatus { order_id, status } => {
                info!(order_id = %order_id, status = %status, "order status changed");
                self.order_statuses.insert(order_id, status);
            }
            RelayInput::Connected(message) => debug!(%message, "relay connected"),
            RelayInput::ServerError(message) => {
                warn!(%message, "relay reported an error");
                self.last_error = Some(message);
            }
        }
    }

    /// Connects the relay for the current call.
    pub async fn connect_relay(&mut self, url: &str) -> Result<(), SessionError> {
        let Some(call_id) = self.call_id.clone() else {
            return Err(SessionError::InvalidState {
                action: "connect the relay",
                state: self.state,
            });
        };
        let relay = RelayClient::connect(url, &call_id).await?;
        self.attach_relay(relay);
        Ok(())
    }

    pub fn attach_relay(&mut self, relay: RelayClient) {
        self.relay = Some(relay);
    }

    // -----------------------------------------------------------------------
    // Summary follow-ups
    // -----------------------------------------------------------------------

    /// Translates the call summary to Vietnamese.
    ///
    /// On failure the fixed apology text is returned and the stored
    /// translation is left as it was.
    pub async fn translate_summary(&mut self) -> Result<String, SessionError> {
        let Some(summary) = self.call_summary.as_ref().filter(|s| !s.generating) else {
            return Err(SessionError::InvalidState {
                action: "translate the summary",
                state: self.state,
            });
        };
        match self.api.translate(&summary.content).await {
            Ok(translated) => {
                self.translated_summary = Some(translated.clone());
                Ok(translated)
            }
            Err(e) => {
                warn!(error = %e, "summary translation failed");
                Ok(TRANSLATION_FAILED.to_string())
            }
        }
    }

    /// Records that the summary email went out. Returns `false` if it had
    /// already been sent for this session.
    pub fn mark_email_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.email_sent_for_current_session, true)
    }

    /// Replaces the order, as edited by the guest before confirming.
    pub fn set_order_summary(&mut self, order: OrderSummary) {
        self.order_summary = Some(order);
    }

    /// Files the current order with staff and starts tracking it.
    pub async fn confirm_order(&mut self) -> Result<Order, SessionError> {
        let (Some(call_id), Some(order)) = (self.call_id.clone(), self.order_summary.clone()) else {
            return Err(SessionError::InvalidState {
                action: "confirm an order",
                state: self.state,
            });
        };
        let special_instructions = Some(order.special_instructions.trim().to_string())
            .filter(|s| !s.is_empty());
        let params = CreateOrderParams {
            call_id,
            room_number: order.room_number.clone(),
            order_type: order.order_type.clone(),
            delivery_time: order.delivery_time,
            special_instructions,
            items: order.items.clone(),
            total_amount: order.total_amount,
        };
        let created = self.api.create_order(&params).await?;
        info!(reference = %created.reference, "order confirmed");
        self.active_orders
            .add(ActiveOrder {
                reference: created.reference.clone(),
                requested_at: self.request_received_at.unwrap_or_else(Utc::now),
                estimated_time: estimated_time(order.delivery_time).to_string(),
            })
            .await;
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Checkpoints
    // -----------------------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            transcripts: self.ledger.read_ordered().to_vec(),
            order_summary: self.order_summary.clone(),
            call_summary: self.call_summary.clone(),
            service_requests: self.service_requests.clone(),
            translated_summary: self.translated_summary.clone(),
            email_sent_for_current_session: self.email_sent_for_current_session,
            request_received_at: self.request_received_at,
            active_orders: self.active_orders.orders(),
        }
    }

    pub async fn save_checkpoint(&mut self, name: Option<&str>) -> Checkpoint {
        let snapshot = self.snapshot();
        let checkpoint = self.checkpoints.save(name, snapshot, Utc::now()).await;
        info!(id = %checkpoint.id, name = %checkpoint.name, "checkpoint saved");
        checkpoint
    }

    /// Restores the checkpoint with `id`. Unknown ids are ignored and yield
    /// `false`.
    pub async fn load_checkpoint(&mut self, id: &str) -> bool {
        let Some(checkpoint) = self.checkpoints.get(id).cloned() else {
            debug!(id, "no such checkpoint");
            return false;
        };
        let state = checkpoint.state;
        self.ledger.restore(state.transcripts);
        if self.state != SessionState::Active {
            self.ledger.freeze();
        }
        self.normalizer.resume_after(self.ledger.last_sequence());
        self.order_summary = state.order_summary;
        self.call_summary = state.call_summary;
        self.service_requests = state.service_requests;
        self.translated_summary = state.translated_summary;
        self.email_sent_for_current_session = state.email_sent_for_current_session;
        self.request_received_at = state.request_received_at;
        self.active_orders.replace_all(state.active_orders).await;
        info!(id, "checkpoint loaded");
        true
    }

    /// Ends any live call and clears every piece of session state,
    /// including the persisted active orders.
    pub async fn reset_to_checkpoint(&mut self) {
        self.teardown().await;
        self.clear_call_state();
        self.request_received_at = None;
        self.call_id = None;
        self.started_at = None;
        self.last_error = None;
        self.state = SessionState::Idle;
        self.active_orders.clear().await;
        info!("session reset");
    }

    /// Stops the call if it is live, cancels timers and closes the relay.
    pub async fn teardown(&mut self) {
        if matches!(self.state, SessionState::Connecting | SessionState::Active) {
            if let Err(e) = self.voice.stop().await {
                debug!(error = %e, "stop during teardown failed");
            }
        }
        self.reported_timer.reset();
        self.local_timer.reset();
        if let Some(task) = self.summary_task.take() {
            task.abort();
        }
        if let Some(relay) = self.relay.take() {
            relay.close().await;
        }
    }

    fn clear_call_state(&mut self) {
        self.reported_timer.reset();
        self.local_timer.reset();
        self.normalizer.reset();
        self.ledger.clear();
        self.order_summary = None;
        self.call_summary = None;
        self.service_requests.clear();
        self.translated_summary = None;
        self.email_sent_for_current_session = false;
        self.summary_preview.clear();
        self.muted = false;
        self.mic_level = 0.0;
        self.assistant_speaking = false;
        self.last_error = None;
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn call_id(&self) -> Option<&str> {
        self.call_id.as_deref()
    }

    pub fn session(&self) -> CallSession {
        CallSession {
            id: self.call_id.clone(),
            state: self.state,
            started_at: self.started_at,
            duration: self.duration_secs(),
            muted: self.muted,
            mic_level: self.mic_level,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        display_duration(self.reported_timer.seconds(), self.local_timer.seconds())
    }

    pub fn transcripts(&self) -> &[TranscriptEvent] {
        self.ledger.read_ordered()
    }

    pub fn late_transcripts(&self) -> usize {
        self.ledger.late_arrivals()
    }

    pub fn live_caption(&self) -> Option<&LiveCaption> {
        self.normalizer.live_caption()
    }

    pub fn order_summary(&self) -> Option<&OrderSummary> {
        self.order_summary.as_ref()
    }

    pub fn call_summary(&self) -> Option<&CallSummary> {
        self.call_summary.as_ref()
    }

    pub fn service_requests(&self) -> &[ServiceRequest] {
        &self.service_requests
    }

    pub fn translated_summary(&self) -> Option<&str> {
        self.translated_summary.as_deref()
    }

    pub fn email_sent_for_current_session(&self) -> bool {
        self.email_sent_for_current_session
    }

    pub fn request_received_at(&self) -> Option<DateTime<Utc>> {
        self.request_received_at
    }

    /// Summary text streamed over the relay while generation is running.
    pub fn summary_preview(&self) -> &str {
        &self.summary_preview
    }

    pub fn order_status(&self, order_id: &str) -> Option<&str> {
        self.order_statuses.get(order_id).map(String::as_str)
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn mic_level(&self) -> f32 {
        self.mic_level
    }

    pub fn assistant_speaking(&self) -> bool {
        self.assistant_speaking
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn active_orders(&self) -> &ActiveOrderTracker {
        &self.active_orders
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }
}

impl Drop for SessionMachine {
    fn drop(&mut self) {
        if let Some(task) = self.summary_task.take() {
            task.abort();
        }
    }
}
