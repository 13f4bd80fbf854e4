//! Configuration for idlemon-server
//!
//! CLI arguments and environment variables via clap. A `.env` file is loaded
//! before parsing, so every flag can also come from there.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args as ClapArgs, Parser};

use crate::content::AccrualRates;
use crate::economy::AccrualPolicy;
use crate::hub::SessionConfig;

/// Idlemon game server
#[derive(Parser, Debug, Clone)]
#[command(name = "idlemon-server")]
#[command(about = "Idle game backend: economy engine and real-time hub")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Deployment environment (development or production)
    #[arg(long, env = "ENV", default_value = "development")]
    pub env: String,

    /// SQLite ledger database file
    #[arg(long, env = "DATABASE_PATH", default_value = "idlemon.db")]
    pub database_path: PathBuf,

    /// Pooled ledger connections
    #[arg(long, env = "DB_POOL_SIZE", default_value = "4")]
    pub db_pool_size: usize,

    /// Drop and recreate every table at startup
    #[arg(long, default_value = "false")]
    pub drop_tables: bool,

    /// Game content TOML file (quests, unit templates, rates); built-in defaults if unset
    #[arg(long, env = "CONTENT_PATH")]
    pub content_path: Option<PathBuf>,

    /// Client version reported by /version
    #[arg(long, env = "CLIENT_VERSION", default_value = "1.0.0")]
    pub client_version: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (pretty or json)
    #[arg(long, env = "LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Deadline for a request's ledger transaction, in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "5000")]
    pub request_timeout_ms: u64,

    /// Largest accepted request body
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "512")]
    pub max_body_bytes: usize,

    /// API token lifetime in seconds
    #[arg(long, env = "TOKEN_TTL_SECS", default_value = "43200")]
    pub token_ttl_secs: u64,

    /// Events the hub inbox holds before broadcasts are refused
    #[arg(long, env = "HUB_INBOX_CAPACITY", default_value = "1024")]
    pub hub_inbox_capacity: usize,

    /// Seconds to let in-flight requests and sockets finish on shutdown
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value = "5")]
    pub shutdown_timeout_secs: u64,

    #[command(flatten)]
    pub admin: AdminArgs,

    #[command(flatten)]
    pub accrual: AccrualArgs,

    #[command(flatten)]
    pub ws: WsArgs,
}

/// Boot-time administrator account
#[derive(ClapArgs, Debug, Clone)]
pub struct AdminArgs {
    /// Create the administrator account at startup if it does not exist
    #[arg(long, env = "INSERT_ADMIN")]
    pub insert_admin: bool,

    #[arg(long, env = "ADMIN_NAME", default_value = "Admin")]
    pub admin_name: String,

    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@idlemon.com")]
    pub admin_email: String,

    /// Required when INSERT_ADMIN is set
    #[arg(long, env = "ADMIN_PASS", hide_env_values = true)]
    pub admin_pass: Option<String>,
}

/// Accrual window bounds
#[derive(ClapArgs, Debug, Clone)]
pub struct AccrualArgs {
    /// Longest idle span that pays out, in seconds
    #[arg(long, env = "ACCRUAL_MAX_WINDOW_SECS", default_value = "86400")]
    pub accrual_max_window_secs: i64,

    /// Shortest span that pays out, in seconds
    #[arg(long, env = "ACCRUAL_MIN_GRANULARITY_SECS", default_value = "1")]
    pub accrual_min_granularity_secs: i64,
}

/// Client socket liveness and sizing
#[derive(ClapArgs, Debug, Clone)]
pub struct WsArgs {
    /// Ping interval in seconds; must be below the pong timeout
    #[arg(long, env = "WS_PING_INTERVAL_SECS", default_value = "54")]
    pub ws_ping_interval_secs: u64,

    /// Seconds to wait for a pong before dropping the client
    #[arg(long, env = "WS_PONG_TIMEOUT_SECS", default_value = "60")]
    pub ws_pong_timeout_secs: u64,

    /// Seconds allowed for one socket write
    #[arg(long, env = "WS_WRITE_TIMEOUT_SECS", default_value = "10")]
    pub ws_write_timeout_secs: u64,

    /// Largest inbound socket message in bytes
    #[arg(long, env = "WS_MAX_MESSAGE_BYTES", default_value = "512")]
    pub ws_max_message_bytes: usize,

    /// Outbound frames buffered per client before eviction
    #[arg(long, env = "WS_OUTBOUND_CAPACITY", default_value = "256")]
    pub ws_outbound_capacity: usize,
}

impl Args {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            max_message_bytes: self.ws.ws_max_message_bytes,
            ping_interval: Duration::from_secs(self.ws.ws_ping_interval_secs),
            pong_timeout: Duration::from_secs(self.ws.ws_pong_timeout_secs),
            write_timeout: Duration::from_secs(self.ws.ws_write_timeout_secs),
            outbound_capacity: self.ws.ws_outbound_capacity,
        }
    }

    pub fn accrual_policy(&self, rates: AccrualRates) -> AccrualPolicy {
        AccrualPolicy {
            max_window_secs: self.accrual.accrual_max_window_secs,
            min_granularity_secs: self.accrual.accrual_min_granularity_secs,
            rates,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !matches!(self.env.as_str(), "development" | "production" | "test") {
            return Err(format!(
                "ENV must be development, production or test (got {})",
                self.env
            ));
        }

        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            return Err(format!("LOG_FORMAT must be pretty or json (got {})", self.log_format));
        }

        if self.db_pool_size == 0 {
            return Err("DB_POOL_SIZE must be at least 1".to_string());
        }

        if self.request_timeout_ms == 0 || self.max_body_bytes == 0 {
            return Err("REQUEST_TIMEOUT_MS and MAX_BODY_BYTES must be positive".to_string());
        }

        if self.hub_inbox_capacity == 0 {
            return Err("HUB_INBOX_CAPACITY must be at least 1".to_string());
        }

        if self.admin.insert_admin {
            let pass = self.admin.admin_pass.as_deref().unwrap_or_default();
            crate::auth::validate_password(pass)
                .map_err(|e| format!("ADMIN_PASS is required with INSERT_ADMIN: {}", e))?;
            crate::accounts::normalize_name(&self.admin.admin_name)
                .map_err(|e| format!("ADMIN_NAME: {}", e))?;
            crate::accounts::normalize_email(&self.admin.admin_email)
                .map_err(|e| format!("ADMIN_EMAIL: {}", e))?;
        }

        let accrual = &self.accrual;
        if accrual.accrual_min_granularity_secs < 1 {
            return Err("ACCRUAL_MIN_GRANULARITY_SECS must be at least 1".to_string());
        }
        if accrual.accrual_max_window_secs < accrual.accrual_min_granularity_secs {
            return Err(
                "ACCRUAL_MAX_WINDOW_SECS must not be below ACCRUAL_MIN_GRANULARITY_SECS".to_string(),
            );
        }

        let ws = &self.ws;
        if ws.ws_ping_interval_secs == 0 || ws.ws_ping_interval_secs >= ws.ws_pong_timeout_secs {
            return Err("WS_PING_INTERVAL_SECS must be positive and below WS_PONG_TIMEOUT_SECS".to_string());
        }
        if ws.ws_outbound_capacity == 0 {
            return Err("WS_OUTBOUND_CAPACITY must be at least 1".to_string());
        }

        Ok(())
    }
}
