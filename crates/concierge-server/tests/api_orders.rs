use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use concierge_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use concierge_server::api_ws::CallHub;
use concierge_server::generator::{ChunkHandler, GenerationError, TextGenerator};
use concierge_server::{app, AppState};
use concierge_types::TranscriptLine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

const SECRET: &str = "staff-secret";

struct NoGenerator;

#[async_trait]
impl TextGenerator for NoGenerator {
    async fn summarize(
        &self,
        _: &[TranscriptLine],
        _: ChunkHandler,
    ) -> Result<String, GenerationError> {
        Err(GenerationError::MissingApiKey)
    }

    async fn translate(&self, _: &str) -> Result<String, GenerationError> {
        Err(GenerationError::MissingApiKey)
    }
}

fn setup_pool() -> DbPool {
    let pool = create_pool(
        ":memory:",
        DbRuntimeSettings {
            pool_max_size: 1,
            ..DbRuntimeSettings::default()
        },
    )
    .unwrap();
    run_migrations(&pool.get().unwrap()).unwrap();
    pool
}

fn state(secret: Option<&str>) -> AppState {
    AppState {
        pool: setup_pool(),
        hub: CallHub::new(),
        generator: Arc::new(NoGenerator),
        staff_jwt_secret: secret.map(str::to_string),
    }
}

fn staff_token(secret: &str) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        &json!({ "sub": "frontdesk" }),
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

async fn send(router: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn order_body(room: &str) -> Value {
    json!({
        "callId": "call-1",
        "roomNumber": room,
        "orderType": "Room Service",
        "deliveryTime": "asap",
        "specialInstructions": "No onions",
        "items": [
            { "id": "1", "name": "Club Sandwich", "description": "", "quantity": 2, "price": 15.0 }
        ],
        "totalAmount": 30.0
    })
}

fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("Authorization", format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

#[tokio::test]
async fn created_orders_are_pending_with_a_reference() {
    let router = app(state(None));

    let (status, order) = send(&router, request("POST", "/api/orders", Some(order_body("204")), None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["status"], "pending");
    assert_eq!(order["roomNumber"], "204");
    let reference = order["reference"].as_str().unwrap();
    assert!(reference.starts_with("#ORD-"));
    assert_eq!(reference.len(), "#ORD-".len() + 5);

    let id = order["id"].as_i64().unwrap();
    let (status, fetched) = send(&router, request("GET", &format!("/api/orders/{id}"), None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["reference"], reference);
    assert_eq!(fetched["specialInstructions"], "No onions");
}

#[tokio::test]
async fn invalid_orders_are_rejected() {
    let router = app(state(None));
    let mut body = order_body("204");
    body["items"] = json!([]);
    let (status, json) = send(&router, request("POST", "/api/orders", Some(body), None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().starts_with("Invalid order data"));
}

#[tokio::test]
async fn unknown_orders_are_not_found() {
    let router = app(state(None));
    for uri in ["/api/orders/999", "/api/orders/abc"] {
        let (status, json) = send(&router, request("GET", uri, None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"], "Order not found");
    }
}

#[tokio::test]
async fn orders_are_listed_by_room() {
    let router = app(state(None));
    for room in ["204", "204", "310"] {
        send(&router, request("POST", "/api/orders", Some(order_body(room)), None)).await;
    }
    let (status, json) = send(&router, request("GET", "/api/orders/room/204", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn staff_routes_check_the_bearer_token() {
    let unconfigured = app(state(None));
    let (status, json) = send(
        &unconfigured,
        request("GET", "/api/staff/orders", None, Some(&staff_token(SECRET))),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"], "JWT secret not configured");

    let router = app(state(Some(SECRET)));
    let (status, json) = send(&router, request("GET", "/api/staff/orders", None, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Authorization header missing or invalid");

    let (status, json) = send(
        &router,
        request("GET", "/api/staff/orders", None, Some(&staff_token("wrong"))),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["error"], "Invalid or expired token");

    let (status, json) = send(
        &router,
        request("GET", "/api/staff/orders", None, Some(&staff_token(SECRET))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn staff_status_update_filters_and_notifies_the_call() {
    let state = state(Some(SECRET));
    let hub = state.hub.clone();
    let router = app(state);
    let token = staff_token(SECRET);

    let (tx, mut rx) = mpsc::channel(8);
    let connection = hub.add_connection(tx).await;
    hub.subscribe(connection, "call-1".to_string()).await;

    let (_, order) = send(&router, request("POST", "/api/orders", Some(order_body("204")), None)).await;
    send(&router, request("POST", "/api/orders", Some(order_body("310")), None)).await;
    let id = order["id"].as_i64().unwrap();

    let (status, json) = send(
        &router,
        request("PATCH", &format!("/api/orders/{id}/status"), Some(json!({})), Some(&token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Status is required");

    let (status, updated) = send(
        &router,
        request(
            "PATCH",
            &format!("/api/orders/{id}/status"),
            Some(json!({ "status": "completed" })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "completed");

    let pushed: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
    assert_eq!(pushed["type"], "order_status_update");
    assert_eq!(pushed["orderId"], id.to_string());
    assert_eq!(pushed["status"], "completed");

    let (_, completed) = send(
        &router,
        request("GET", "/api/staff/orders?status=completed", None, Some(&token)),
    )
    .await;
    assert_eq!(completed.as_array().unwrap().len(), 1);

    let (_, by_room) = send(
        &router,
        request("GET", "/api/staff/orders?roomNumber=310&status=", None, Some(&token)),
    )
    .await;
    assert_eq!(by_room.as_array().unwrap().len(), 1);
    assert_eq!(by_room[0]["roomNumber"], "310");

    let (status, _) = send(
        &router,
        request(
            "PATCH",
            "/api/orders/999/status",
            Some(json!({ "status": "completed" })),
            Some(&token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
