//! Call summaries, stored transcripts and translation.

use axum::extract::{Extension, Json, Path};
use chrono::Utc;
use concierge_session::{extract_service_requests, parse_order_details};
use concierge_store::{
    get_call_summary, list_recent_summaries, list_transcripts, upsert_call_summary,
    StoredSummary, StoredTranscript, UpsertSummaryParams,
};
use concierge_types::frames::ServerFrame;
use concierge_types::{ServiceRequest, TranscriptLine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::api::{with_conn, ApiError};
use crate::generator::{basic_summary, ChunkHandler, GenerationError};
use crate::AppState;

const DEFAULT_RECENT_HOURS: u32 = 24;
const MAX_RECENT_HOURS: u32 = 72;

/// Request body for `POST /api/store-summary`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummaryRequest {
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub transcripts: Option<Vec<TranscriptLine>>,
    /// `m:ss`.
    #[serde(default)]
    pub call_duration: Option<String>,
    #[serde(default)]
    pub force_basic_summary: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummaryResponse {
    pub summary: String,
    pub service_requests: Vec<ServiceRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecentSummariesResponse {
    pub success: bool,
    pub count: usize,
    pub timeframe: String,
    pub summaries: Vec<StoredSummary>,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateResponse {
    pub success: bool,
    pub translated_text: String,
}

/// Handler for `POST /api/store-summary`.
///
/// Generates the summary (streaming chunks to the call's relay subscribers),
/// stores it under the call id and returns it with the service requests
/// found in it.
pub async fn store_summary_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<StoreSummaryRequest>,
) -> Result<Json<StoreSummaryResponse>, ApiError> {
    let (Some(call_id), Some(transcripts)) = (
        payload.call_id.filter(|id| !id.trim().is_empty()),
        payload.transcripts,
    ) else {
        return Err(ApiError::BadRequest("Missing callId or transcripts".to_string()));
    };

    let summary = if payload.force_basic_summary {
        basic_summary(&transcripts)
    } else {
        match stream_summary(&state, &call_id, &transcripts).await {
            Ok(summary) if !summary.is_empty() => summary,
            Ok(_) | Err(GenerationError::MissingApiKey) => {
                tracing::info!(call_id = %call_id, "using basic summary");
                basic_summary(&transcripts)
            }
            Err(e) => {
                tracing::error!(call_id = %call_id, error = %e, "summary generation failed");
                return Err(ApiError::InternalServerError(
                    "Failed to store summary".to_string(),
                ));
            }
        }
    };

    state
        .hub
        .broadcast_frame(
            &call_id,
            &ServerFrame::AssistantResponse {
                call_id: call_id.clone(),
                assistant_reply_text: summary.clone(),
                is_final: true,
                timestamp: Utc::now(),
            },
        )
        .await;

    let room_number = parse_order_details(&summary).room_number;
    let duration = payload.call_duration;
    let stored_call_id = call_id.clone();
    let content = summary.clone();
    with_conn(&state.pool, "Failed to store summary", move |conn| {
        upsert_call_summary(
            conn,
            &UpsertSummaryParams {
                call_id: &stored_call_id,
                content: &content,
                room_number: room_number.as_deref(),
                duration: duration.as_deref(),
                at: Utc::now(),
            },
        )
    })
    .await?;
    tracing::info!(call_id = %call_id, "stored call summary");

    let service_requests = extract_service_requests(&summary);
    Ok(Json(StoreSummaryResponse {
        summary,
        service_requests,
    }))
}

/// Runs the generator, relaying each chunk as a non-final
/// `assistantResponse` frame in the order it was produced.
async fn stream_summary(
    state: &Arc<AppState>,
    call_id: &str,
    transcripts: &[TranscriptLine],
) -> Result<String, GenerationError> {
    let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
    let hub = state.hub.clone();
    let forward_call_id = call_id.to_string();
    let forwarder = tokio::spawn(async move {
        while let Some(chunk) = chunk_rx.recv().await {
            hub.broadcast_frame(
                &forward_call_id,
                &ServerFrame::AssistantResponse {
                    call_id: forward_call_id.clone(),
                    assistant_reply_text: chunk,
                    is_final: false,
                    timestamp: Utc::now(),
                },
            )
            .await;
        }
    });

    let on_chunk: ChunkHandler = Arc::new(move |chunk| {
        let _ = chunk_tx.send(chunk);
    });
    let result = state.generator.summarize(transcripts, on_chunk).await;

    // The handler, and with it the last sender, is gone once `summarize`
    // returns, so the forwarder drains what is queued and stops.
    if let Err(e) = forwarder.await {
        tracing::warn!(call_id = %call_id, "summary chunk forwarder failed: {}", e);
    }
    result
}

/// Handler for `GET /api/summaries/{callId}`.
pub async fn get_summary_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<StoredSummary>, ApiError> {
    // Bare numbers are hour counts meant for the `recent` route.
    if !call_id.is_empty() && call_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ApiError::NotFound("Call summary not found".to_string()));
    }

    let summary = with_conn(&state.pool, "Failed to retrieve call summary", move |conn| {
        get_call_summary(conn, &call_id)
    })
    .await?;
    summary
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Call summary not found".to_string()))
}

/// Clamps a requested window to `1..=72` hours; unparsable or zero means 24.
pub fn recent_window_hours(raw: &str) -> u32 {
    match raw.trim().parse::<i64>() {
        Ok(0) | Err(_) => DEFAULT_RECENT_HOURS,
        Ok(hours) => hours.clamp(1, i64::from(MAX_RECENT_HOURS)) as u32,
    }
}

/// Handler for `GET /api/summaries/recent/{hours}`.
pub async fn recent_summaries_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(hours): Path<String>,
) -> Result<Json<RecentSummariesResponse>, ApiError> {
    let hours = recent_window_hours(&hours);
    let summaries = with_conn(
        &state.pool,
        "Failed to retrieve recent call summaries",
        move |conn| list_recent_summaries(conn, hours, Utc::now()),
    )
    .await?;

    Ok(Json(RecentSummariesResponse {
        success: true,
        count: summaries.len(),
        timeframe: format!("{hours} hours"),
        summaries,
    }))
}

/// Handler for `GET /api/transcripts/{callId}`.
pub async fn list_transcripts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<Vec<StoredTranscript>>, ApiError> {
    let transcripts = with_conn(&state.pool, "Failed to retrieve transcripts", move |conn| {
        list_transcripts(conn, &call_id)
    })
    .await?;
    Ok(Json(transcripts))
}

/// Handler for `POST /api/translate-to-vietnamese`.
pub async fn translate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    let text = payload
        .text
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Text content is required".to_string()))?;

    let translated_text = state.generator.translate(&text).await.map_err(|e| {
        tracing::error!(error = %e, "translation failed");
        ApiError::InternalServerError("Failed to translate text to Vietnamese".to_string())
    })?;

    Ok(Json(TranslateResponse {
        success: true,
        translated_text,
    }))
}
