//! Client for the concierge HTTP backend.

use std::time::Duration;

use async_trait::async_trait;
use concierge_types::{CreateOrderParams, Order, ServiceRequest, TranscriptLine};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BackendError;

/// Upper bound on a single backend request, summary generation included.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Body of `POST /api/store-summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRequest {
    pub call_id: String,
    pub transcripts: Vec<TranscriptLine>,
    /// `m:ss`.
    pub call_duration: String,
    #[serde(default)]
    pub force_basic_summary: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryResponse {
    pub summary: String,
    #[serde(default)]
    pub service_requests: Vec<ServiceRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    success: bool,
    #[serde(default)]
    translated_text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// The backend operations a session needs.
#[async_trait]
pub trait ConciergeApi: Send + Sync {
    /// Generates (and stores) the summary for a finished call.
    async fn generate_summary(&self, request: &SummaryRequest) -> Result<SummaryResponse, BackendError>;

    /// Translates summary text to Vietnamese.
    async fn translate(&self, text: &str) -> Result<String, BackendError>;

    /// Files a confirmed order with staff.
    async fn create_order(&self, params: &CreateOrderParams) -> Result<Order, BackendError>;
}

/// [`ConciergeApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpConciergeApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpConciergeApi {
    /// Builds a client whose requests give up after [`REQUEST_TIMEOUT`].
    pub fn new(base_url: impl Into<String>) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Turns a non-success response into [`BackendError::Status`], using the
/// `{"error": ...}` body when there is one.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or(body);
    Err(BackendError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn decode<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| BackendError::Malformed(e.to_string()))
}

#[async_trait]
impl ConciergeApi for HttpConciergeApi {
    async fn generate_summary(&self, request: &SummaryRequest) -> Result<SummaryResponse, BackendError> {
        let resp = self
            .client
            .post(self.url("/api/store-summary"))
            .json(request)
            .send()
            .await?;
        decode(check_status(resp).await?).await
    }

    async fn translate(&self, text: &str) -> Result<String, BackendError> {
        let resp = self
            .client
            .post(self.url("/api/translate-to-vietnamese"))
            .json(&serde_json::json!({ "text": text }))
            .send()
            .await?;
        let body: TranslateResponse = decode(check_status(resp).await?).await?;
        match (body.success, body.translated_text) {
            (true, Some(translated)) => Ok(translated),
            (_, _) => Err(BackendError::Malformed(
                body.error
                    .unwrap_or_else(|| "translation missing from response".to_string()),
            )),
        }
    }

    async fn create_order(&self, params: &CreateOrderParams) -> Result<Order, BackendError> {
        let resp = self
            .client
            .post(self.url("/api/orders"))
            .json(params)
            .send()
            .await?;
        decode(check_status(resp).await?).await
    }
}
