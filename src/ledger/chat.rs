//! Chat history.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{from_unix, parse_id};
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRow {
    pub id: i64,
    pub user_id: Uuid,
    pub sender_name: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

fn map_chat(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    let user_id: String = row.get(1)?;
    Ok(ChatRow {
        id: row.get(0)?,
        user_id: parse_id(&user_id)?,
        sender_name: row.get(2)?,
        message: row.get(3)?,
        sent_at: from_unix(row.get(4)?),
    })
}

pub fn insert_message(
    conn: &Connection,
    user_id: Uuid,
    sender_name: &str,
    message: &str,
    now: i64,
) -> Result<ChatRow> {
    conn.execute(
        "INSERT INTO chat_messages (user_id, sender_name, message, sent_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id.to_string(), sender_name, message, now],
    )?;
    Ok(ChatRow {
        id: conn.last_insert_rowid(),
        user_id,
        sender_name: sender_name.to_string(),
        message: message.to_string(),
        sent_at: from_unix(now),
    })
}

/// Newest first. `before` pages backwards from a message id (exclusive).
pub fn list_messages(conn: &Connection, before: Option<i64>, limit: i64) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, user_id, sender_name, message, sent_at FROM chat_messages
         WHERE ?1 IS NULL OR id < ?1
         ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![before, limit], map_chat)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}
