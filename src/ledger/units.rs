//! Units owned by a user.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::from_unix;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitRow {
    pub id: i64,
    pub template_id: i64,
    pub level: i64,
    pub stars: i64,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

fn map_unit(row: &Row<'_>) -> rusqlite::Result<UnitRow> {
    Ok(UnitRow {
        id: row.get(0)?,
        template_id: row.get(1)?,
        level: row.get(2)?,
        stars: row.get(3)?,
        locked: row.get(4)?,
        created_at: from_unix(row.get(5)?),
    })
}

/// Insert a fresh level-1, one-star, unlocked unit
pub fn insert_unit(conn: &Connection, user_id: Uuid, template_id: i64, now: i64) -> Result<UnitRow> {
    conn.execute(
        "INSERT INTO units (user_id, template_id, level, stars, locked, created_at)
         VALUES (?1, ?2, 1, 1, 0, ?3)",
        params![user_id.to_string(), template_id, now],
    )?;
    Ok(UnitRow {
        id: conn.last_insert_rowid(),
        template_id,
        level: 1,
        stars: 1,
        locked: false,
        created_at: from_unix(now),
    })
}

pub fn list_units(conn: &Connection, user_id: Uuid) -> Result<Vec<UnitRow>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, template_id, level, stars, locked, created_at FROM units
         WHERE user_id = ?1 ORDER BY id",
    )?;
    let rows = stmt.query_map([user_id.to_string()], map_unit)?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Flip the lock flag on a unit the user owns. `None` when no such unit.
pub fn toggle_lock(conn: &Connection, user_id: Uuid, unit_id: i64) -> Result<Option<UnitRow>> {
    let updated = conn.execute(
        "UPDATE units SET locked = NOT locked WHERE id = ?1 AND user_id = ?2",
        params![unit_id, user_id.to_string()],
    )?;
    if updated == 0 {
        return Ok(None);
    }
    Ok(conn
        .query_row(
            "SELECT id, template_id, level, stars, locked, created_at FROM units WHERE id = ?1",
            [unit_id],
            map_unit,
        )
        .optional()?)
}
