//! Guest orders and the staff order board.

use axum::{
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
};
use chrono::Utc;
use concierge_store::{
    create_order, get_order, list_orders, list_orders_by_room, update_order_status, OrderFilter,
    StoreError,
};
use concierge_types::frames::ServerFrame;
use concierge_types::{CreateOrderParams, Order};
use rand::Rng;
use rusqlite::Connection;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::{with_conn, ApiError};
use crate::AppState;

/// Fresh references tried before giving up on a unique one.
const MAX_REFERENCE_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    #[serde(default)]
    pub status: Option<String>,
}

/// Query string of `GET /api/staff/orders`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffOrdersQuery {
    pub status: Option<String>,
    pub room_number: Option<String>,
}

/// Formats a staff-facing order reference, `#ORD-` and five digits.
pub fn generate_reference(rng: &mut impl Rng) -> String {
    format!("#ORD-{}", rng.gen_range(10_000..100_000))
}

fn validate_order(params: &CreateOrderParams) -> Result<(), ApiError> {
    let missing = [
        ("callId", &params.call_id),
        ("roomNumber", &params.room_number),
        ("orderType", &params.order_type),
    ]
    .into_iter()
    .find(|(_, value)| value.trim().is_empty());
    if let Some((field, _)) = missing {
        return Err(ApiError::BadRequest(format!(
            "Invalid order data: {field} is required"
        )));
    }
    if params.items.is_empty() {
        return Err(ApiError::BadRequest(
            "Invalid order data: at least one item is required".to_string(),
        ));
    }
    if params.items.iter().any(|item| item.quantity == 0) {
        return Err(ApiError::BadRequest(
            "Invalid order data: item quantity must be positive".to_string(),
        ));
    }
    if !params.total_amount.is_finite() || params.total_amount < 0.0 {
        return Err(ApiError::BadRequest(
            "Invalid order data: totalAmount must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn is_constraint_violation(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Database(rusqlite::Error::SqliteFailure(e, _))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Inserts the order under a random reference, drawing again on collision.
fn insert_with_fresh_reference(
    conn: &Connection,
    params: &CreateOrderParams,
) -> Result<Order, StoreError> {
    let mut rng = rand::thread_rng();
    let mut attempt = 1;
    loop {
        let reference = generate_reference(&mut rng);
        match create_order(conn, &reference, params, Utc::now()) {
            Err(e) if attempt < MAX_REFERENCE_ATTEMPTS && is_constraint_violation(&e) => {
                tracing::debug!(reference = %reference, attempt, "order reference taken, retrying");
                attempt += 1;
            }
            result => return result,
        }
    }
}

fn order_not_found(err: ApiError) -> ApiError {
    match err {
        ApiError::NotFound(_) => ApiError::NotFound("Order not found".to_string()),
        other => other,
    }
}

/// Handler for `POST /api/orders`.
pub async fn create_order_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(params): Json<CreateOrderParams>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    validate_order(&params)?;

    let order = with_conn(&state.pool, "Failed to create order", move |conn| {
        insert_with_fresh_reference(conn, &params)
    })
    .await?;
    tracing::info!(
        order_id = order.id,
        reference = %order.reference,
        call_id = %order.call_id,
        room_number = %order.room_number,
        "order created"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// Handler for `GET /api/orders/{id}`.
pub async fn get_order_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::NotFound("Order not found".to_string()))?;
    let order = with_conn(&state.pool, "Failed to retrieve order", move |conn| {
        get_order(conn, id)
    })
    .await
    .map_err(order_not_found)?;
    Ok(Json(order))
}

/// Handler for `GET /api/orders/room/{roomNumber}`.
pub async fn list_room_orders_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(room_number): Path<String>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = with_conn(&state.pool, "Failed to retrieve orders", move |conn| {
        list_orders_by_room(conn, &room_number)
    })
    .await?;
    Ok(Json(orders))
}

/// Handler for `PATCH /api/orders/{id}/status` (staff only).
///
/// Pushes `order_status_update` to the relay subscribers of the order's call.
pub async fn update_order_status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status = payload
        .status
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Status is required".to_string()))?;
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::NotFound("Order not found".to_string()))?;

    let new_status = status.clone();
    let order = with_conn(&state.pool, "Failed to update order status", move |conn| {
        update_order_status(conn, id, &new_status, Utc::now())
    })
    .await
    .map_err(order_not_found)?;
    tracing::info!(order_id = id, status = %status, "order status updated");

    state
        .hub
        .broadcast_frame(
            &order.call_id,
            &ServerFrame::OrderStatusUpdate {
                order_id: order.id.to_string(),
                status,
            },
        )
        .await;
    Ok(Json(order))
}

/// Handler for `GET /api/staff/orders` (staff only).
pub async fn staff_orders_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<StaffOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let filter = OrderFilter {
        status: query.status.filter(|s| !s.is_empty()),
        room_number: query.room_number.filter(|s| !s.is_empty()),
    };
    let orders = with_conn(&state.pool, "Failed to retrieve staff orders", move |conn| {
        list_orders(conn, &filter)
    })
    .await?;
    Ok(Json(orders))
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_types::{DeliveryTime, OrderItem};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn params() -> CreateOrderParams {
        CreateOrderParams {
            call_id: "call-1".to_string(),
            room_number: "204".to_string(),
            order_type: "Room Service".to_string(),
            delivery_time: DeliveryTime::Asap,
            special_instructions: None,
            items: vec![OrderItem {
                id: "1".to_string(),
                name: "Club Sandwich".to_string(),
                description: String::new(),
                quantity: 1,
                price: 15.0,
                service_type: None,
            }],
            total_amount: 15.0,
        }
    }

    #[test]
    fn references_have_five_digits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let reference = generate_reference(&mut rng);
            let digits = reference.strip_prefix("#ORD-").unwrap();
            assert_eq!(digits.len(), 5);
            assert!(digits.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn validation_rejects_incomplete_orders() {
        assert!(validate_order(&params()).is_ok());

        let mut no_room = params();
        no_room.room_number = " ".to_string();
        assert!(matches!(validate_order(&no_room), Err(ApiError::BadRequest(m)) if m.contains("roomNumber")));

        let mut no_items = params();
        no_items.items.clear();
        assert!(validate_order(&no_items).is_err());

        let mut negative = params();
        negative.total_amount = -1.0;
        assert!(validate_order(&negative).is_err());
    }
}
