//! Campaign accrual rows.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{GameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccrualState {
    pub level: i64,
    /// Unix seconds
    pub last_collected_at: i64,
}

/// Read the accrual row. Call inside a transaction before advancing it.
pub fn lock_accrual(conn: &Connection, user_id: Uuid) -> Result<AccrualState> {
    conn.query_row(
        "SELECT level, last_collected_at FROM campaign WHERE user_id = ?1",
        [user_id.to_string()],
        |row| {
            Ok(AccrualState {
                level: row.get(0)?,
                last_collected_at: row.get(1)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| GameError::NotFound(format!("campaign for user {}", user_id)))
}

/// Move `last_collected_at` forward from the value read under lock.
///
/// Refuses to move it backwards or to overwrite a value it did not read.
pub fn advance_collected_at(conn: &Connection, user_id: Uuid, previous: i64, next: i64) -> Result<()> {
    if next < previous {
        return Err(GameError::Integrity(format!(
            "last_collected_at for user {} would move back ({} -> {})",
            user_id, previous, next
        )));
    }
    let updated = conn.execute(
        "UPDATE campaign SET last_collected_at = ?3
         WHERE user_id = ?1 AND last_collected_at = ?2",
        params![user_id.to_string(), previous, next],
    )?;
    if updated != 1 {
        return Err(GameError::Integrity(format!(
            "campaign row for user {} changed under lock",
            user_id
        )));
    }
    Ok(())
}

/// Overwrite level and accrual timestamp. Administrative; bypasses accrual.
pub fn set_state(conn: &Connection, user_id: Uuid, state: AccrualState) -> Result<()> {
    let updated = conn.execute(
        "UPDATE campaign SET level = ?2, last_collected_at = ?3 WHERE user_id = ?1",
        params![user_id.to_string(), state.level, state.last_collected_at],
    )?;
    if updated == 0 {
        return Err(GameError::NotFound(format!("campaign for user {}", user_id)));
    }
    Ok(())
}
