//! Idlemon server - idle game backend
//!
//! Two halves share one process:
//!
//! - **Economy**: transactional, idempotent ledger operations (accrual
//!   collection, daily quests, spend-and-acquire) over SQLite
//! - **Hub**: a single coordinator task that owns every live client socket
//!   and fans chat events out to them
//!
//! The HTTP and WebSocket front end in [`server`] authenticates callers and
//! hands work to one or the other.

pub mod accounts;
pub mod auth;
pub mod config;
pub mod content;
pub mod economy;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod logging;
pub mod routes;
pub mod server;

pub use config::Args;
pub use error::{GameError, Result};
pub use server::{run, AppState};
