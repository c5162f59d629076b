use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use concierge_session::{
    BackendError, ConciergeApi, SessionConfig, SessionError, SessionMachine, SessionState,
    SummaryRequest, SummaryResponse, ACTIVE_ORDERS_KEY,
};
use concierge_store::{LocalStore, MemoryLocalStore};
use concierge_types::{
    CreateOrderParams, Order, OrderSummary, Role, SUMMARY_FAILED, SUMMARY_GENERATING,
    SUMMARY_TOO_SHORT, TRANSLATION_FAILED,
};
use concierge_voice::{
    SimulatedVoiceClient, Speaker, StartBehavior, TranscriptType, VoiceEvent, VoiceMessage,
};
use tokio::sync::Notify;

#[derive(Default)]
struct MockApi {
    summary: Mutex<Option<String>>,
    summary_calls: AtomicUsize,
    requests: Mutex<Vec<SummaryRequest>>,
    translation: Mutex<Option<String>>,
    orders: AtomicUsize,
    /// The first summary request waits on the gate, then answers with the text.
    held: Mutex<Option<(Arc<Notify>, String)>>,
}

impl MockApi {
    fn with_summary(summary: &str) -> Self {
        let api = Self::default();
        *api.summary.lock().unwrap() = Some(summary.to_string());
        api
    }
}

#[async_trait]
impl ConciergeApi for MockApi {
    async fn generate_summary(&self, request: &SummaryRequest) -> Result<SummaryResponse, BackendError> {
        self.summary_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let held = self.held.lock().unwrap().take();
        if let Some((gate, summary)) = held {
            gate.notified().await;
            return Ok(SummaryResponse {
                summary,
                service_requests: Vec::new(),
            });
        }
        match self.summary.lock().unwrap().clone() {
            Some(summary) => Ok(SummaryResponse {
                summary,
                service_requests: Vec::new(),
            }),
            None => Err(BackendError::Status {
                status: 500,
                message: "generator unavailable".to_string(),
            }),
        }
    }

    async fn translate(&self, _text: &str) -> Result<String, BackendError> {
        self.translation
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| BackendError::Malformed("no translation".to_string()))
    }

    async fn create_order(&self, params: &CreateOrderParams) -> Result<Order, BackendError> {
        let n = self.orders.fetch_add(1, Ordering::SeqCst) + 1;
        let now = Utc::now().to_rfc3339();
        Ok(Order {
            id: n as i64,
            reference: format!("#ORD-{}", 10000 + n),
            call_id: params.call_id.clone(),
            room_number: params.room_number.clone(),
            order_type: params.order_type.clone(),
            delivery_time: params.delivery_time,
            special_instructions: params.special_instructions.clone(),
            items: params.items.clone(),
            total_amount: params.total_amount,
            status: "pending".to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }
}

struct Harness {
    voice: Arc<SimulatedVoiceClient>,
    api: Arc<MockApi>,
    store: Arc<MemoryLocalStore>,
    session: SessionMachine,
}

async fn harness(api: MockApi) -> Harness {
    let voice = Arc::new(SimulatedVoiceClient::new());
    let api = Arc::new(api);
    let store = Arc::new(MemoryLocalStore::new());
    let config = SessionConfig {
        assistant_id: "concierge".to_string(),
        start_timeout: Duration::from_secs(15),
        ..SessionConfig::default()
    };
    let session = SessionMachine::new(config, voice.clone(), api.clone(), store.clone()).await;
    Harness {
        voice,
        api,
        store,
        session,
    }
}

fn final_transcript(role: Speaker, text: &str) -> VoiceEvent {
    VoiceEvent::Message(VoiceMessage::Transcript {
        role,
        transcript_type: TranscriptType::Final,
        transcript: text.to_string(),
    })
}

#[tokio::test]
async fn end_to_end_summary_fills_room_number() {
    let mut h = harness(MockApi::with_summary("Room 204, club sandwich, ASAP")).await;

    let call_id = h.session.start_call().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Active);

    h.voice.emit(final_transcript(Speaker::Assistant, "Welcome to Mi Nhon Hotel."));
    h.voice.emit(final_transcript(Speaker::User, "Room 204, a club sandwich please."));
    h.session.drain_voice_events().await;
    assert_eq!(h.session.transcripts().len(), 2);

    h.session.end_call().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Summarizing);
    assert_eq!(h.session.call_summary().unwrap().content, SUMMARY_GENERATING);

    assert!(h.session.await_resolution().await);
    assert_eq!(h.session.state(), SessionState::Completed);
    let order = h.session.order_summary().unwrap();
    assert_eq!(order.room_number, "204");
    assert_eq!(h.session.call_summary().unwrap().content, "Room 204, club sandwich, ASAP");

    let requests = h.api.requests.lock().unwrap();
    assert_eq!(requests[0].call_id, call_id);
    assert_eq!(requests[0].transcripts[0].role, Role::Assistant);
    assert_eq!(requests[0].transcripts[1].role, Role::User);
}

#[tokio::test]
async fn one_entry_transcript_skips_generation() {
    let mut h = harness(MockApi::with_summary("unused")).await;
    h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::User, "Hello?"));
    h.session.drain_voice_events().await;

    h.session.end_call().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Completed);
    assert_eq!(h.session.call_summary().unwrap().content, SUMMARY_TOO_SHORT);
    assert_eq!(h.api.summary_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.session.order_summary(), Some(&OrderSummary::default_template()));
}

#[tokio::test]
async fn generation_failure_completes_with_fallback() {
    let mut h = harness(MockApi::default()).await;
    h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::Assistant, "Hi"));
    h.voice.emit(final_transcript(Speaker::User, "Room 12"));
    h.session.drain_voice_events().await;

    h.session.end_call().await.unwrap();
    h.session.await_resolution().await;
    assert_eq!(h.session.state(), SessionState::Completed);
    assert_eq!(h.session.call_summary().unwrap().content, SUMMARY_FAILED);
    assert_eq!(h.session.order_summary(), Some(&OrderSummary::default_template()));
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_start_fails_visibly() {
    let mut h = harness(MockApi::default()).await;
    h.voice.set_start_behavior(StartBehavior::Hang);

    let err = h.session.start_call().await.unwrap_err();
    assert!(matches!(err, SessionError::StartTimedOut(_)));
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.session.last_error().is_some());
    assert_eq!(h.voice.stops(), 1);

    // Failed allows a retry.
    h.voice.set_start_behavior(StartBehavior::Accept);
    h.session.start_call().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Active);
}

#[tokio::test]
async fn rejected_start_fails_with_message() {
    let mut h = harness(MockApi::default()).await;
    h.voice.set_start_behavior(StartBehavior::Reject("no microphone".to_string()));
    assert!(matches!(h.session.start_call().await, Err(SessionError::Voice(_))));
    assert_eq!(h.session.state(), SessionState::Failed);
    assert!(h.session.last_error().unwrap().contains("no microphone"));
}

#[tokio::test]
async fn failed_mute_leaves_flag_unchanged() {
    let mut h = harness(MockApi::default()).await;
    assert!(matches!(
        h.session.toggle_mute().await,
        Err(SessionError::InvalidState { .. })
    ));

    h.session.start_call().await.unwrap();
    assert!(h.session.toggle_mute().await.unwrap());
    assert!(h.session.is_muted());

    h.voice.set_fail_mute(true);
    assert!(h.session.toggle_mute().await.is_err());
    assert!(h.session.is_muted());
    assert!(h.session.last_error().is_some());
}

#[tokio::test]
async fn new_call_during_pending_summary_drops_the_old_result() {
    let api = MockApi::with_summary("Room 301");
    let gate = Arc::new(Notify::new());
    *api.held.lock().unwrap() = Some((gate.clone(), "Room 999".to_string()));
    let mut h = harness(api).await;

    let first = h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::Assistant, "Hi"));
    h.voice.emit(final_transcript(Speaker::User, "Room 999"));
    h.session.drain_voice_events().await;
    h.session.end_call().await.unwrap();
    assert_eq!(h.session.state(), SessionState::Summarizing);
    while h.api.summary_calls.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    let second = h.session.start_call().await.unwrap();
    assert_ne!(first, second);
    assert_eq!(h.session.state(), SessionState::Active);
    assert!(h.session.call_summary().is_none());
    h.session.drain_voice_events().await;

    gate.notify_one();
    tokio::time::timeout(Duration::from_secs(5), h.session.process_next())
        .await
        .expect("the earlier summary should arrive");
    assert_eq!(h.session.state(), SessionState::Active);
    assert!(h.session.call_summary().is_none());
    assert!(h.session.order_summary().is_none());

    h.voice.emit(final_transcript(Speaker::Assistant, "Hello again"));
    h.voice.emit(final_transcript(Speaker::User, "Room 301"));
    h.session.drain_voice_events().await;
    h.session.end_call().await.unwrap();
    assert!(h.session.await_resolution().await);
    assert_eq!(h.session.state(), SessionState::Completed);
    assert_eq!(h.session.order_summary().unwrap().room_number, "301");
    assert_eq!(h.session.call_summary().unwrap().call_id, second);
    assert_eq!(h.api.summary_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sdk_call_end_finishes_the_call() {
    let mut h = harness(MockApi::with_summary("Room 5")).await;
    h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::Assistant, "Hi"));
    h.voice.emit(final_transcript(Speaker::User, "Room 5"));
    h.session.say("Goodbye", true).await.unwrap();
    h.session.drain_voice_events().await;

    assert_eq!(h.session.state(), SessionState::Summarizing);
    h.voice.emit(final_transcript(Speaker::User, "one more thing"));
    h.session.drain_voice_events().await;
    assert_eq!(h.session.transcripts().len(), 2);
    assert_eq!(h.session.late_transcripts(), 1);
}

#[tokio::test]
async fn volume_is_clamped_and_speaking_tracked() {
    let mut h = harness(MockApi::default()).await;
    h.session.start_call().await.unwrap();
    h.session.handle_voice_event(VoiceEvent::VolumeLevel(3.5)).await;
    assert_eq!(h.session.mic_level(), 1.0);
    h.session.handle_voice_event(VoiceEvent::VolumeLevel(-1.0)).await;
    assert_eq!(h.session.mic_level(), 0.0);

    h.session.handle_voice_event(VoiceEvent::SpeechStart).await;
    assert!(h.session.assistant_speaking());
    h.session.handle_voice_event(VoiceEvent::SpeechEnd).await;
    assert!(!h.session.assistant_speaking());
}

#[tokio::test]
async fn relay_frames_for_the_current_call_join_the_ledger() {
    let mut h = harness(MockApi::default()).await;
    let call_id = h.session.start_call().await.unwrap();

    let interim = serde_json::json!({
        "type": "transcript", "callId": call_id, "role": "user",
        "content": "I need", "utteranceId": "u1", "isFinal": false, "timestamp": Utc::now(),
    });
    let final_ = serde_json::json!({
        "type": "transcript(final)", "callId": call_id, "role": "user",
        "content": "I need towels", "utteranceId": "u1", "isFinal": true, "timestamp": Utc::now(),
    });
    let other = serde_json::json!({
        "type": "transcript(final)", "callId": "another", "role": "user",
        "content": "not mine", "isFinal": true, "timestamp": Utc::now(),
    });
    h.session.handle_relay_frame(&interim.to_string());
    h.session.handle_relay_frame(&final_.to_string());
    h.session.handle_relay_frame(&other.to_string());
    h.session.handle_relay_frame("not json");

    let lines: Vec<_> = h.session.transcripts().iter().map(|e| e.content.as_str()).collect();
    assert_eq!(lines, ["I need towels"]);
    assert!(h.session.transcripts()[0].is_final);
}

#[tokio::test]
async fn checkpoint_round_trip_restores_state() {
    let mut h = harness(MockApi::with_summary("Room 204, club sandwich, ASAP")).await;
    h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::Assistant, "Hi"));
    h.voice.emit(final_transcript(Speaker::User, "Room 204"));
    h.session.drain_voice_events().await;
    h.session.end_call().await.unwrap();
    h.session.await_resolution().await;
    h.session.confirm_order().await.unwrap();

    let saved = h.session.snapshot();
    let checkpoint = h.session.save_checkpoint(Some("after order")).await;

    h.session.reset_to_checkpoint().await;
    assert_eq!(h.session.state(), SessionState::Idle);
    assert!(h.session.order_summary().is_none());
    assert!(h.session.transcripts().is_empty());
    assert!(!h.store.contains(ACTIVE_ORDERS_KEY));

    assert!(!h.session.load_checkpoint("no-such-id").await);
    assert!(h.session.load_checkpoint(&checkpoint.id).await);
    assert_eq!(h.session.snapshot(), saved);
    assert_eq!(h.session.active_orders().orders().len(), 1);
    assert!(h.store.get(ACTIVE_ORDERS_KEY).await.unwrap().is_some());
}

#[tokio::test]
async fn checkpoints_retain_the_ten_newest() {
    let mut h = harness(MockApi::default()).await;
    for i in 0..12 {
        h.session.save_checkpoint(Some(&format!("cp{i}"))).await;
    }
    let names: Vec<_> = h.session.checkpoints().list().map(|c| c.name.clone()).collect();
    assert_eq!(names.len(), 10);
    assert_eq!(names.first().map(String::as_str), Some("cp2"));
    assert_eq!(names.last().map(String::as_str), Some("cp11"));
}

#[tokio::test]
async fn translation_failure_returns_fixed_message() {
    let mut h = harness(MockApi::with_summary("Room 8, spa booking")).await;
    h.session.start_call().await.unwrap();
    h.voice.emit(final_transcript(Speaker::Assistant, "Hi"));
    h.voice.emit(final_transcript(Speaker::User, "Spa please"));
    h.session.drain_voice_events().await;
    h.session.end_call().await.unwrap();
    h.session.await_resolution().await;

    assert_eq!(h.session.translate_summary().await.unwrap(), TRANSLATION_FAILED);
    assert!(h.session.translated_summary().is_none());

    *h.api.translation.lock().unwrap() = Some("Phòng 8, đặt spa".to_string());
    assert_eq!(h.session.translate_summary().await.unwrap(), "Phòng 8, đặt spa");
    assert_eq!(h.session.translated_summary(), Some("Phòng 8, đặt spa"));

    assert!(h.session.mark_email_sent());
    assert!(!h.session.mark_email_sent());
}

#[tokio::test(start_paused = true)]
async fn duration_prefers_reported_timer() {
    let mut h = harness(MockApi::default()).await;
    h.session.start_call().await.unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;
    // CallStart has not been processed yet, so only the local timer runs.
    assert_eq!(h.session.duration_secs(), 2);

    h.session.drain_voice_events().await;
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(h.session.duration_secs(), 1);
}
