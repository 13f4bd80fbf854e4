//! SQLite ledger store
//!
//! Holds everything the economy mutates: per-user resource balances, campaign
//! accrual state, quest progress and owned units, plus accounts and chat history.
//!
//! ## Locking
//!
//! Every mutation runs inside [`LedgerStore::transaction`], which opens the
//! transaction with `BEGIN IMMEDIATE`. SQLite grants the write lock at that point,
//! so any row read inside the transaction is as good as `SELECT ... FOR UPDATE`.
//! Row accessors are still called in a fixed order (campaign or quest row first,
//! then ledger rows by ascending resource id).
//!
//! ## Tables
//!
//! - `users` - accounts (name, email, password hash)
//! - `ledger` - `(user_id, resource_id) -> amount`, never negative
//! - `campaign` - `user_id -> (level, last_collected_at)`
//! - `quest_progress` - `(user_id, quest_id) -> (count, last_completed_at)`
//! - `units` - summoned units
//! - `chat_messages` - chat history

pub mod accounts;
pub mod balances;
pub mod campaign;
pub mod chat;
pub mod quests;
pub mod schema;
pub mod units;

use std::path::Path;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::{debug, info, warn};

use crate::error::{GameError, Result};

/// Lock and checkout wait used when a transaction carries no deadline
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

type SqlitePool = Pool<SqliteConnectionManager>;
type PooledSqlite = PooledConnection<SqliteConnectionManager>;

/// Pooled SQLite connections over one ledger database
pub struct LedgerStore {
    pool: SqlitePool,
}

impl LedgerStore {
    /// Open or create the ledger database with `pool_size` connections
    pub fn open(path: &Path, pool_size: usize, drop_tables: bool) -> Result<Self> {
        info!("Opening ledger database at {:?} (pool size {})", path, pool_size);

        // WAL lets readers proceed while one writer holds the lock
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
            )?;
            conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1) as u32)
            .connection_timeout(DEFAULT_BUSY_TIMEOUT)
            .build(manager)
            .map_err(|e| GameError::Internal(format!("Failed to open SQLite pool: {}", e)))?;

        let store = Self { pool };
        store.init_schema(drop_tables)?;
        Ok(store)
    }

    /// Open an in-memory ledger (for testing)
    ///
    /// Every in-memory connection is its own database, so the pool holds exactly
    /// one and never recycles it.
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory ledger database");

        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys=ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_timeout(DEFAULT_BUSY_TIMEOUT)
            .build(manager)
            .map_err(|e| {
                GameError::Internal(format!("Failed to open in-memory SQLite: {}", e))
            })?;

        let store = Self { pool };
        store.init_schema(false)?;
        Ok(store)
    }

    fn init_schema(&self, drop_tables: bool) -> Result<()> {
        let conn = self.checkout(None)?;
        if drop_tables {
            schema::reset_schema(&conn)
        } else {
            schema::init_schema(&conn)
        }
    }

    /// Check a connection out of the pool, waiting no later than `deadline`
    fn checkout(&self, deadline: Option<Instant>) -> Result<PooledSqlite> {
        let wait = match deadline {
            Some(deadline) => remaining(deadline, "deadline passed before checkout")?,
            None => DEFAULT_BUSY_TIMEOUT,
        };
        self.pool.get_timeout(wait).map_err(|e| {
            warn!("No ledger connection within {:?}: {}", wait, e);
            GameError::Timeout(format!("no ledger connection available: {}", e))
        })
    }

    /// Run read-only queries outside a write transaction
    pub fn read<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.checkout(None)?;
        f(&conn)
    }

    /// Run `f` inside an immediate (write-locked) transaction.
    ///
    /// Both the pool checkout and the SQLite lock wait are bounded by `deadline`.
    /// Commits only if `f` succeeds and `deadline` has not passed; otherwise the
    /// transaction is dropped, which rolls it back.
    pub fn transaction<F, T>(&self, deadline: Option<Instant>, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.checkout(deadline)?;

        let wait = match deadline {
            Some(deadline) => remaining(deadline, "deadline passed before begin")?,
            None => DEFAULT_BUSY_TIMEOUT,
        };
        conn.busy_timeout(wait)?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            warn!("Ledger transaction outlived its deadline, rolling back");
            return Err(GameError::Timeout("deadline passed before commit".into()));
        }
        tx.commit()?;
        Ok(out)
    }
}

fn remaining(deadline: Instant, what: &str) -> Result<Duration> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(GameError::Timeout(what.into()));
    }
    Ok(left)
}

/// Unix seconds to a UTC timestamp
pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Parse a stored identity column
pub(crate) fn parse_id(raw: &str) -> rusqlite::Result<uuid::Uuid> {
    uuid::Uuid::parse_str(raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub use accounts::{NewUser, UserRow};
pub use campaign::AccrualState;
pub use chat::ChatRow;
pub use quests::QuestProgress;
pub use units::UnitRow;
