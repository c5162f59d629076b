//! Summary and translation text generation.
//!
//! [`OpenAiGenerator`] talks to any OpenAI-compatible `/chat/completions`
//! endpoint. Summaries are requested with `stream: true` and each delta is
//! handed to a [`ChunkHandler`] as it arrives so the relay can show the
//! summary while it is still being written.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use concierge_types::{Role, TranscriptLine};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::GenerationConfig;

/// Receives streamed summary text as it is generated.
pub type ChunkHandler = Arc<dyn Fn(String) + Send + Sync>;

const SUMMARY_PROMPT: &str = "You summarize phone calls between hotel guests and the \
Mi Nhon Hotel voice assistant for front-desk staff. Write a concise summary in English. \
Start with the guest's room number as 'Room Number: <number>' when it was mentioned. \
List every request on its own line. For food and drink orders list each item as \
'<quantity> x <item> - $<price>', then 'Total: $<amount>', the delivery time and any \
special instructions as 'Special Instructions: <text>'. Do not invent details that were \
not said.";

const TRANSLATE_PROMPT: &str = "Translate the user's text into natural Vietnamese. \
Keep room numbers, prices, times and item quantities unchanged. Reply with the \
translation only.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("no generation API key is configured")]
    MissingApiKey,

    #[error("generation request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid generation response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Summarizes a call transcript, passing text deltas to `on_chunk` as
    /// they are produced. Returns the complete summary.
    async fn summarize(
        &self,
        transcripts: &[TranscriptLine],
        on_chunk: ChunkHandler,
    ) -> Result<String, GenerationError>;

    async fn translate(&self, text: &str) -> Result<String, GenerationError>;
}

/// Builds a summary from the transcript alone, without a model.
///
/// The output is deterministic for a given transcript.
pub fn basic_summary(transcripts: &[TranscriptLine]) -> String {
    let guest_lines: Vec<&str> = transcripts
        .iter()
        .filter(|line| line.role == Role::User)
        .map(|line| line.content.trim())
        .filter(|content| !content.is_empty())
        .collect();

    let mut summary = String::from("Call Summary\n\n");
    if guest_lines.is_empty() {
        summary.push_str("The guest did not make any requests during this call.");
        return summary;
    }

    summary.push_str("Guest requests:\n");
    for line in &guest_lines {
        summary.push_str("- ");
        summary.push_str(line);
        summary.push('\n');
    }
    let assistant_turns = transcripts
        .iter()
        .filter(|line| line.role == Role::Assistant)
        .count();
    summary.push_str(&format!(
        "\nThe conversation had {} guest and {} assistant turns.",
        guest_lines.len(),
        assistant_turns
    ));
    summary
}

fn transcript_text(transcripts: &[TranscriptLine]) -> String {
    transcripts
        .iter()
        .map(|line| {
            let speaker = match line.role {
                Role::User => "Guest",
                Role::Assistant => "Assistant",
            };
            format!("{speaker}: {}", line.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// [`TextGenerator`] backed by an OpenAI-compatible chat completion API.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_base: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self, GenerationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, GenerationError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerationError::MissingApiKey)?;
        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn summarize(
        &self,
        transcripts: &[TranscriptLine],
        on_chunk: ChunkHandler,
    ) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "stream": true,
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": SUMMARY_PROMPT },
                { "role": "user", "content": transcript_text(transcripts) },
            ],
        });
        let response = self.post(&body).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.to_ascii_lowercase().contains("text/event-stream"));
        if !is_event_stream {
            let raw = response.text().await?;
            let text = completion_text(&raw)?;
            if !text.is_empty() {
                on_chunk(text.clone());
            }
            return Ok(text);
        }

        read_event_stream(response, &on_chunk).await
    }

    async fn translate(&self, text: &str) -> Result<String, GenerationError> {
        let body = json!({
            "model": self.model,
            "temperature": 0.2,
            "messages": [
                { "role": "system", "content": TRANSLATE_PROMPT },
                { "role": "user", "content": text },
            ],
        });
        let raw = self.post(&body).await?.text().await?;
        completion_text(&raw)
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: Option<StreamDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

fn completion_text(raw: &str) -> Result<String, GenerationError> {
    let parsed: CompletionResponse = serde_json::from_str(raw)
        .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GenerationError::InvalidResponse("response contained no choices".to_string()))?;
    Ok(choice.message.content.unwrap_or_default().trim().to_string())
}

async fn read_event_stream(
    response: reqwest::Response,
    on_chunk: &ChunkHandler,
) -> Result<String, GenerationError> {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();
    let mut text = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let fragment = std::str::from_utf8(chunk.as_ref()).map_err(|e| {
            GenerationError::InvalidResponse(format!("invalid UTF-8 in stream: {e}"))
        })?;
        buffer.push_str(fragment);

        while let Some(pos) = buffer.find('\n') {
            let line = buffer[..pos].trim().to_string();
            buffer.drain(..=pos);
            if let Some(data) = line.strip_prefix("data:") {
                let data = data.trim();
                if data == "[DONE]" {
                    return Ok(text.trim().to_string());
                }
                apply_stream_data(data, on_chunk, &mut text)?;
            }
        }
    }

    if let Some(data) = buffer.trim().strip_prefix("data:") {
        let data = data.trim();
        if data != "[DONE]" {
            apply_stream_data(data, on_chunk, &mut text)?;
        }
    }
    Ok(text.trim().to_string())
}

fn apply_stream_data(
    data: &str,
    on_chunk: &ChunkHandler,
    text: &mut String,
) -> Result<(), GenerationError> {
    let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
        GenerationError::InvalidResponse(format!("failed to parse stream chunk: {e}"))
    })?;
    for choice in chunk.choices {
        let Some(delta) = choice.delta.and_then(|d| d.content) else {
            continue;
        };
        if !delta.is_empty() {
            text.push_str(&delta);
            on_chunk(delta);
        }
    }
    Ok(())
}
