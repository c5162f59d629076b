//! Transcript lines received over the relay.

use chrono::{DateTime, Utc};
use concierge_types::Role;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::{db_timestamp, StoreError};

/// A persisted transcript line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredTranscript {
    pub id: i64,
    pub call_id: String,
    pub role: Role,
    pub content: String,
    pub is_final: bool,
    pub utterance_id: Option<String>,
    /// ISO 8601.
    pub timestamp: String,
}

/// Parameters for [`record_transcript`].
#[derive(Debug, Clone)]
pub struct RecordTranscriptParams<'a> {
    pub call_id: &'a str,
    pub role: Role,
    pub content: &'a str,
    pub is_final: bool,
    pub utterance_id: Option<&'a str>,
    pub at: DateTime<Utc>,
}

/// Stores a transcript line.
///
/// Lines with an utterance id upsert: a later revision of the same utterance
/// replaces the stored interim text, but a stored final line is never
/// downgraded back to interim.
pub fn record_transcript(
    conn: &Connection,
    params: &RecordTranscriptParams<'_>,
) -> Result<StoredTranscript, StoreError> {
    let created_at = db_timestamp(params.at);
    let stored = match params.utterance_id {
        Some(utterance_id) => conn.query_row(
            "INSERT INTO transcripts (call_id, role, content, is_final, utterance_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(call_id, utterance_id) WHERE utterance_id IS NOT NULL DO UPDATE SET
                content = CASE WHEN transcripts.is_final = 1 THEN transcripts.content ELSE excluded.content END,
                is_final = MAX(transcripts.is_final, excluded.is_final)
             RETURNING id, call_id, role, content, is_final, utterance_id, created_at",
            params![
                params.call_id,
                params.role.as_str(),
                params.content,
                params.is_final,
                utterance_id,
                created_at,
            ],
            map_row_to_transcript,
        )?,
        None => conn.query_row(
            "INSERT INTO transcripts (call_id, role, content, is_final, utterance_id, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5)
             RETURNING id, call_id, role, content, is_final, utterance_id, created_at",
            params![
                params.call_id,
                params.role.as_str(),
                params.content,
                params.is_final,
                created_at,
            ],
            map_row_to_transcript,
        )?,
    };
    Ok(stored)
}

/// Lists a call's transcript lines oldest-first.
pub fn list_transcripts(
    conn: &Connection,
    call_id: &str,
) -> Result<Vec<StoredTranscript>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, call_id, role, content, is_final, utterance_id, created_at
         FROM transcripts WHERE call_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([call_id], map_row_to_transcript)?;
    let mut transcripts = Vec::new();
    for row in rows {
        transcripts.push(row?);
    }
    Ok(transcripts)
}

fn map_row_to_transcript(row: &Row) -> rusqlite::Result<StoredTranscript> {
    let role_label: String = row.get(2)?;
    let role = Role::parse(&role_label).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown role: {role_label}").into(),
        )
    })?;
    Ok(StoredTranscript {
        id: row.get(0)?,
        call_id: row.get(1)?,
        role,
        content: row.get(3)?,
        is_final: row.get(4)?,
        utterance_id: row.get(5)?,
        timestamp: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::setup_db;

    fn line<'a>(content: &'a str, is_final: bool, utterance_id: Option<&'a str>) -> RecordTranscriptParams<'a> {
        RecordTranscriptParams {
            call_id: "call-1",
            role: Role::User,
            content,
            is_final,
            utterance_id,
            at: Utc::now(),
        }
    }

    #[test]
    fn lines_without_utterance_id_append() {
        let conn = setup_db();
        record_transcript(&conn, &line("hello", true, None)).unwrap();
        record_transcript(&conn, &line("hello", true, None)).unwrap();
        assert_eq!(list_transcripts(&conn, "call-1").unwrap().len(), 2);
    }

    #[test]
    fn final_revision_replaces_interim_row() {
        let conn = setup_db();
        let interim = record_transcript(&conn, &line("I'd like a club", false, Some("u1"))).unwrap();
        let fin = record_transcript(&conn, &line("I'd like a club sandwich", true, Some("u1"))).unwrap();
        assert_eq!(interim.id, fin.id);

        let rows = list_transcripts(&conn, "call-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_final);
        assert_eq!(rows[0].content, "I'd like a club sandwich");
    }

    #[test]
    fn final_row_is_not_overwritten_by_late_interim() {
        let conn = setup_db();
        record_transcript(&conn, &line("room two oh four", true, Some("u2"))).unwrap();
        record_transcript(&conn, &line("room two", false, Some("u2"))).unwrap();

        let rows = list_transcripts(&conn, "call-1").unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_final);
        assert_eq!(rows[0].content, "room two oh four");
    }

    #[test]
    fn listing_is_scoped_to_call() {
        let conn = setup_db();
        record_transcript(&conn, &line("a", true, None)).unwrap();
        let mut other = line("b", true, None);
        other.call_id = "call-2";
        record_transcript(&conn, &other).unwrap();

        let rows = list_transcripts(&conn, "call-2").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "b");
    }
}
