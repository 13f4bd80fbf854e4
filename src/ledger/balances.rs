//! Ledger rows: one non-negative amount per user per resource.

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::economy::{Balances, ResourceKind};
use crate::error::{GameError, Result};

/// Read the named rows in lock order. Call inside a transaction before writing them.
pub fn lock_balances(conn: &Connection, user_id: Uuid, kinds: &[ResourceKind]) -> Result<Balances> {
    let mut ordered = kinds.to_vec();
    ordered.sort();
    ordered.dedup();

    let id = user_id.to_string();
    let mut stmt = conn.prepare_cached(
        "SELECT amount FROM ledger WHERE user_id = ?1 AND resource_id = ?2",
    )?;

    let mut balances = Balances::new();
    for kind in ordered {
        let amount: Option<i64> = stmt
            .query_row(params![id, kind.id()], |row| row.get(0))
            .optional()?;
        let amount = amount.ok_or_else(|| {
            GameError::NotFound(format!("{} ledger row for user {}", kind, user_id))
        })?;
        balances = balances.with(kind, amount);
    }
    Ok(balances)
}

/// Every ledger row for a user
pub fn all_balances(conn: &Connection, user_id: Uuid) -> Result<Balances> {
    let mut stmt = conn.prepare_cached(
        "SELECT resource_id, amount FROM ledger WHERE user_id = ?1 ORDER BY resource_id",
    )?;
    let rows = stmt.query_map([user_id.to_string()], |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut balances = Balances::new();
    for row in rows {
        let (resource_id, amount) = row?;
        if let Some(kind) = ResourceKind::from_id(resource_id) {
            balances = balances.with(kind, amount);
        }
    }
    Ok(balances)
}

/// Persist `after` over the locked `before` snapshot.
///
/// Each row is updated only if it still holds the amount read under lock and the
/// new amount is non-negative. A miss means the lock discipline was broken.
pub fn write_balances(conn: &Connection, user_id: Uuid, before: &Balances, after: &Balances) -> Result<()> {
    let id = user_id.to_string();
    let mut stmt = conn.prepare_cached(
        "UPDATE ledger SET amount = ?4
         WHERE user_id = ?1 AND resource_id = ?2 AND amount = ?3 AND ?4 >= 0",
    )?;

    for (kind, amount) in after.iter() {
        let previous = before.get(kind);
        if previous == amount {
            continue;
        }
        let updated = stmt.execute(params![id, kind.id(), previous, amount])?;
        if updated != 1 {
            return Err(GameError::Integrity(format!(
                "{} row for user {} changed under lock or would go negative ({} -> {})",
                kind, user_id, previous, amount
            )));
        }
    }
    Ok(())
}
