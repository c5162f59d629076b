//! Staff orders.

use chrono::{DateTime, Utc};
use concierge_types::{CreateOrderParams, DeliveryTime, Order};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{db_timestamp, StoreError};

/// Filters for [`list_orders`]. `None` matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
    pub status: Option<String>,
    pub room_number: Option<String>,
}

const ORDER_COLUMNS: &str = "id, reference, call_id, room_number, order_type, delivery_time,
    special_instructions, items_json, total_amount, status, created_at, updated_at";

/// Creates a new order with status `pending`.
pub fn create_order(
    conn: &Connection,
    reference: &str,
    params: &CreateOrderParams,
    at: DateTime<Utc>,
) -> Result<Order, StoreError> {
    let items_json = serde_json::to_string(&params.items)?;
    let now = db_timestamp(at);
    let sql = format!(
        "INSERT INTO orders (
            reference, call_id, room_number, order_type, delivery_time,
            special_instructions, items_json, total_amount, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'pending', ?9, ?9)
        RETURNING {ORDER_COLUMNS}"
    );
    let order = conn.query_row(
        &sql,
        params![
            reference,
            params.call_id,
            params.room_number,
            params.order_type,
            params.delivery_time.as_str(),
            params.special_instructions,
            items_json,
            params.total_amount,
            now,
        ],
        map_row_to_order,
    )?;
    Ok(order)
}

/// Retrieves an order by its numeric ID.
pub fn get_order(conn: &Connection, id: i64) -> Result<Order, StoreError> {
    conn.query_row(
        &format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?1"),
        [id],
        map_row_to_order,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
}

pub fn list_orders_by_room(conn: &Connection, room_number: &str) -> Result<Vec<Order>, StoreError> {
    list_orders(
        conn,
        &OrderFilter {
            status: None,
            room_number: Some(room_number.to_string()),
        },
    )
}

/// Lists orders newest first, optionally filtered by status and room.
pub fn list_orders(conn: &Connection, filter: &OrderFilter) -> Result<Vec<Order>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders
         WHERE (?1 IS NULL OR status = ?1) AND (?2 IS NULL OR room_number = ?2)
         ORDER BY created_at DESC, id DESC"
    ))?;
    let rows = stmt.query_map(
        params![filter.status, filter.room_number],
        map_row_to_order,
    )?;
    let mut orders = Vec::new();
    for row in rows {
        orders.push(row?);
    }
    Ok(orders)
}

/// Sets an order's status and returns the updated row.
pub fn update_order_status(
    conn: &Connection,
    id: i64,
    status: &str,
    at: DateTime<Utc>,
) -> Result<Order, StoreError> {
    conn.query_row(
        &format!(
            "UPDATE orders SET status = ?1, updated_at = ?2 WHERE id = ?3
             RETURNING {ORDER_COLUMNS}"
        ),
        params![status, db_timestamp(at), id],
        map_row_to_order,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("order {id}")))
}

fn map_row_to_order(row: &Row) -> rusqlite::Result<Order> {
    let delivery_label: String = row.get(5)?;
    let delivery_time = DeliveryTime::parse(&delivery_label).unwrap_or_default();
    let items_json: String = row.get(7)?;
    let items = serde_json::from_str(&items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Order {
        id: row.get(0)?,
        reference: row.get(1)?,
        call_id: row.get(2)?,
        room_number: row.get(3)?,
        order_type: row.get(4)?,
        delivery_time,
        special_instructions: row.get(6)?,
        items,
        total_amount: row.get(8)?,
        status: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}
