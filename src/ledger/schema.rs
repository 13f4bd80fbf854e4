//! Ledger schema definitions

use rusqlite::{Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::{GameError, Result};

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the ledger schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new ledger schema v{}", SCHEMA_VERSION);
        conn.execute_batch(LEDGER_SCHEMA)
            .map_err(|e| GameError::Internal(format!("Failed to create ledger tables: {}", e)))?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(GameError::Config(format!(
            "Ledger schema v{} is newer than this build (v{})",
            current_version, SCHEMA_VERSION
        )));
    } else {
        info!("Ledger schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Drop every ledger table, then recreate the schema
pub fn reset_schema(conn: &Connection) -> Result<()> {
    warn!("Dropping all ledger tables");
    conn.execute_batch(DROP_SCHEMA)
        .map_err(|e| GameError::Internal(format!("Failed to drop ledger tables: {}", e)))?;
    init_schema(conn)
}

fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| GameError::Internal(format!("Failed to create schema_version table: {}", e)))?;

    // An empty table means a fresh database; any other failure is surfaced
    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .optional()
        .map_err(|e| GameError::Internal(format!("Failed to read schema_version: {}", e)))?;

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| GameError::Internal(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| GameError::Internal(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

/// Timestamps are unix seconds (UTC). Identities are hyphenated UUID text.
const LEDGER_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    email TEXT NOT NULL UNIQUE,
    pass_hash TEXT NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    resource_id INTEGER NOT NULL,
    amount INTEGER NOT NULL DEFAULT 0 CHECK (amount >= 0),
    PRIMARY KEY (user_id, resource_id)
);

CREATE TABLE IF NOT EXISTS campaign (
    user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
    level INTEGER NOT NULL DEFAULT 1 CHECK (level >= 1),
    last_collected_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS quest_progress (
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    quest_id INTEGER NOT NULL,
    count INTEGER NOT NULL DEFAULT 0 CHECK (count >= 0),
    last_completed_at INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (user_id, quest_id)
);

CREATE TABLE IF NOT EXISTS units (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    template_id INTEGER NOT NULL,
    level INTEGER NOT NULL DEFAULT 1,
    stars INTEGER NOT NULL DEFAULT 1,
    locked INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_units_user ON units(user_id);

CREATE TABLE IF NOT EXISTS chat_messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    sender_name TEXT NOT NULL,
    message TEXT NOT NULL,
    sent_at INTEGER NOT NULL
);
"#;

const DROP_SCHEMA: &str = r#"
DROP TABLE IF EXISTS chat_messages;
DROP TABLE IF EXISTS units;
DROP TABLE IF EXISTS quest_progress;
DROP TABLE IF EXISTS campaign;
DROP TABLE IF EXISTS ledger;
DROP TABLE IF EXISTS users;
DROP TABLE IF EXISTS schema_version;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_unreadable_version_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE schema_version (version TEXT NOT NULL); INSERT INTO schema_version VALUES ('garbled');",
        )
        .unwrap();
        assert!(matches!(init_schema(&conn), Err(GameError::Internal(_))));

        let users: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'users'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(users, 0);
    }

    #[test]
    fn test_reset_clears_rows() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, name, email, pass_hash, created_at) VALUES ('u', 'n', 'e', 'h', 0)",
            [],
        )
        .unwrap();
        reset_schema(&conn).unwrap();
        let users: i64 = conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(users, 0);
    }

    #[test]
    fn test_negative_amount_rejected_by_store() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (id, name, email, pass_hash, created_at) VALUES ('u', 'n', 'e', 'h', 0)",
            [],
        )
        .unwrap();
        let result = conn.execute(
            "INSERT INTO ledger (user_id, resource_id, amount) VALUES ('u', 1, -1)",
            [],
        );
        assert!(result.is_err());
    }
}
