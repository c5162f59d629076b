//! Concierge server library logic.
//!
//! HTTP API and WebSocket relay for the hotel voice assistant: relayed
//! transcripts, summary generation and storage, translation, and the
//! staff order board.

pub mod api;
pub mod api_orders;
pub mod api_summary;
pub mod api_ws;
pub mod config;
pub mod generator;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use concierge_db::DbPool;
use generator::TextGenerator;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Relay connections by call id.
    pub hub: api_ws::CallHub,
    /// Summary and translation backend.
    pub generator: Arc<dyn TextGenerator>,
    /// HS256 secret for staff tokens, if configured.
    pub staff_jwt_secret: Option<String>,
}

/// Maximum request body size (2 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let staff_routes = Router::new()
        .route(
            "/api/orders/{id}/status",
            patch(api_orders::update_order_status_handler),
        )
        .route("/api/staff/orders", get(api_orders::staff_orders_handler))
        .layer(axum::middleware::from_fn(middleware::staff_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/ws", get(api_ws::ws_handler))
        .route("/api/store-summary", post(api_summary::store_summary_handler))
        .route(
            "/api/summaries/{callId}",
            get(api_summary::get_summary_handler),
        )
        .route(
            "/api/summaries/recent/{hours}",
            get(api_summary::recent_summaries_handler),
        )
        .route(
            "/api/transcripts/{callId}",
            get(api_summary::list_transcripts_handler),
        )
        .route(
            "/api/translate-to-vietnamese",
            post(api_summary::translate_handler),
        )
        .route("/api/orders", post(api_orders::create_order_handler))
        .route("/api/orders/{id}", get(api_orders::get_order_handler))
        .route(
            "/api/orders/room/{roomNumber}",
            get(api_orders::list_room_orders_handler),
        )
        .merge(staff_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
