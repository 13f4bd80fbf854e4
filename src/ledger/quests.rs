//! Daily quest progress rows.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub quest_id: i64,
    pub count: i64,
    /// Unix seconds; 0 means never
    pub last_completed_at: i64,
}

/// Read one progress row. Call inside a transaction before updating it.
pub fn lock_progress(conn: &Connection, user_id: Uuid, quest_id: i64) -> Result<QuestProgress> {
    conn.query_row(
        "SELECT quest_id, count, last_completed_at FROM quest_progress
         WHERE user_id = ?1 AND quest_id = ?2",
        params![user_id.to_string(), quest_id],
        |row| {
            Ok(QuestProgress {
                quest_id: row.get(0)?,
                count: row.get(1)?,
                last_completed_at: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| {
        GameError::NotFound(format!("quest {} progress for user {}", quest_id, user_id))
    })
}

pub fn list_progress(conn: &Connection, user_id: Uuid) -> Result<Vec<QuestProgress>> {
    let mut stmt = conn.prepare_cached(
        "SELECT quest_id, count, last_completed_at FROM quest_progress
         WHERE user_id = ?1 ORDER BY quest_id",
    )?;
    let rows = stmt.query_map([user_id.to_string()], |row| {
        Ok(QuestProgress {
            quest_id: row.get(0)?,
            count: row.get(1)?,
            last_completed_at: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Add `by` to the progress count, creating the row for quests added after sign-up.
pub fn increment_count(conn: &Connection, user_id: Uuid, quest_id: i64, by: i64) -> Result<i64> {
    conn.execute(
        "INSERT INTO quest_progress (user_id, quest_id, count, last_completed_at)
         VALUES (?1, ?2, ?3, 0)
         ON CONFLICT (user_id, quest_id) DO UPDATE SET count = count + excluded.count",
        params![user_id.to_string(), quest_id, by],
    )?;
    Ok(lock_progress(conn, user_id, quest_id)?.count)
}

/// Reset the count and stamp completion, guarded by the values read under lock.
pub fn mark_completed(conn: &Connection, user_id: Uuid, locked: &QuestProgress, now: i64) -> Result<()> {
    let updated = conn.execute(
        "UPDATE quest_progress SET count = 0, last_completed_at = ?5
         WHERE user_id = ?1 AND quest_id = ?2 AND count = ?3 AND last_completed_at = ?4",
        params![
            user_id.to_string(),
            locked.quest_id,
            locked.count,
            locked.last_completed_at,
            now
        ],
    )?;
    if updated != 1 {
        return Err(GameError::Integrity(format!(
            "quest {} row for user {} changed under lock",
            locked.quest_id, user_id
        )));
    }
    Ok(())
}
