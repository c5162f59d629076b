//! Stored call summaries.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{db_timestamp, StoreError};

/// A call summary as kept by the server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredSummary {
    pub id: i64,
    pub call_id: String,
    pub content: String,
    pub room_number: Option<String>,
    /// Call length as `m:ss`.
    pub duration: Option<String>,
    /// ISO 8601.
    pub timestamp: String,
}

#[derive(Debug, Clone)]
pub struct UpsertSummaryParams<'a> {
    pub call_id: &'a str,
    pub content: &'a str,
    pub room_number: Option<&'a str>,
    pub duration: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// Stores the summary for a call, replacing any earlier one.
pub fn upsert_call_summary(
    conn: &Connection,
    params: &UpsertSummaryParams<'_>,
) -> Result<StoredSummary, StoreError> {
    let summary = conn.query_row(
        "INSERT INTO call_summaries (call_id, content, room_number, duration, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(call_id) DO UPDATE SET
            content = excluded.content,
            room_number = COALESCE(excluded.room_number, call_summaries.room_number),
            duration = COALESCE(excluded.duration, call_summaries.duration),
            created_at = excluded.created_at
         RETURNING id, call_id, content, room_number, duration, created_at",
        params![
            params.call_id,
            params.content,
            params.room_number,
            params.duration,
            db_timestamp(params.at),
        ],
        map_row_to_summary,
    )?;
    Ok(summary)
}

pub fn get_call_summary(
    conn: &Connection,
    call_id: &str,
) -> Result<Option<StoredSummary>, StoreError> {
    let summary = conn
        .query_row(
            "SELECT id, call_id, content, room_number, duration, created_at
             FROM call_summaries WHERE call_id = ?1",
            [call_id],
            map_row_to_summary,
        )
        .optional()?;
    Ok(summary)
}

/// Lists summaries stored within the last `hours` hours, newest first.
pub fn list_recent_summaries(
    conn: &Connection,
    hours: u32,
    now: DateTime<Utc>,
) -> Result<Vec<StoredSummary>, StoreError> {
    let since = db_timestamp(now - Duration::hours(i64::from(hours)));
    let mut stmt = conn.prepare(
        "SELECT id, call_id, content, room_number, duration, created_at
         FROM call_summaries WHERE created_at >= ?1
         ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map([since], map_row_to_summary)?;
    let mut summaries = Vec::new();
    for row in rows {
        summaries.push(row?);
    }
    Ok(summaries)
}

fn map_row_to_summary(row: &Row) -> rusqlite::Result<StoredSummary> {
    Ok(StoredSummary {
        id: row.get(0)?,
        call_id: row.get(1)?,
        content: row.get(2)?,
        room_number: row.get(3)?,
        duration: row.get(4)?,
        timestamp: row.get(5)?,
    })
}
