//! User accounts and the rows provisioned alongside them.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use uuid::Uuid;

use super::{from_unix, parse_id};
use crate::economy::ResourceKind;
use crate::error::{GameError, Result};

/// Sentinel for "never completed", so a new account can complete any quest today.
pub const NEVER: i64 = 0;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub pass_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub pass_hash: String,
}

fn map_user(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    let id: String = row.get(0)?;
    Ok(UserRow {
        id: parse_id(&id)?,
        name: row.get(1)?,
        email: row.get(2)?,
        pass_hash: row.get(3)?,
        created_at: from_unix(row.get(4)?),
    })
}

/// Map a unique-key failure on `users` to a conflict naming the field.
fn conflict(err: rusqlite::Error) -> GameError {
    let detail = err.to_string();
    if detail.contains("users.name") {
        GameError::Conflict("name is already taken".into())
    } else if detail.contains("users.email") {
        GameError::Conflict("email is already registered".into())
    } else {
        GameError::from(err)
    }
}

/// Insert a user plus its ledger, campaign and quest rows.
///
/// Must run inside a transaction so a half-provisioned account never exists.
pub fn create_account(conn: &Connection, user: &NewUser, quest_ids: &[i64], now: i64) -> Result<()> {
    let id = user.id.to_string();

    conn.execute(
        "INSERT INTO users (id, name, email, pass_hash, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user.name, user.email, user.pass_hash, now],
    )
    .map_err(conflict)?;

    for kind in ResourceKind::ALL {
        conn.execute(
            "INSERT INTO ledger (user_id, resource_id, amount) VALUES (?1, ?2, 0)",
            params![id, kind.id()],
        )?;
    }

    conn.execute(
        "INSERT INTO campaign (user_id, level, last_collected_at) VALUES (?1, 1, ?2)",
        params![id, now],
    )?;

    for quest_id in quest_ids {
        conn.execute(
            "INSERT INTO quest_progress (user_id, quest_id, count, last_completed_at)
             VALUES (?1, ?2, 0, ?3)",
            params![id, quest_id, NEVER],
        )?;
    }

    Ok(())
}

pub fn get_user(conn: &Connection, id: Uuid) -> Result<Option<UserRow>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, pass_hash, created_at FROM users WHERE id = ?1",
            [id.to_string()],
            map_user,
        )
        .optional()?)
}

pub fn find_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    Ok(conn
        .query_row(
            "SELECT id, name, email, pass_hash, created_at FROM users WHERE email = ?1",
            [email],
            map_user,
        )
        .optional()?)
}

pub fn rename(conn: &Connection, id: Uuid, name: &str) -> Result<()> {
    let updated = conn
        .execute(
            "UPDATE users SET name = ?2 WHERE id = ?1",
            params![id.to_string(), name],
        )
        .map_err(conflict)?;
    if updated == 0 {
        return Err(GameError::NotFound(format!("user {}", id)));
    }
    Ok(())
}
