//! Idlemon server entry point

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};

use idlemon_server::{
    auth::{token::spawn_cleanup_task, MemoryTokenStore, TokenStore},
    config::Args,
    content::GameContent,
    economy::EconomyEngine,
    hub::spawn_hub,
    ledger::LedgerStore,
    logging, server, AppState,
};

const TOKEN_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    logging::init(&args.log_level, &args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Idlemon server {}", env!("CARGO_PKG_VERSION"));
    info!("  commit {} built {}", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Environment: {}", args.env);
    info!("Ledger: {} (pool {})", args.database_path.display(), args.db_pool_size);
    info!("Client version: {}", args.client_version);
    info!("Shutdown grace: {}s", args.shutdown_timeout_secs);
    info!("======================================");

    let content = match &args.content_path {
        Some(path) => {
            info!("Loading game content from {}", path.display());
            GameContent::load(path)?
        }
        None => {
            let content = GameContent::default();
            content.validate()?;
            content
        }
    };
    info!(
        "Game content: {} daily quests, {} unit templates",
        content.quests.len(),
        content.unit_templates.len()
    );

    let ledger = Arc::new(LedgerStore::open(
        &args.database_path,
        args.db_pool_size,
        args.drop_tables,
    )?);
    let policy = args.accrual_policy(content.accrual.clone());
    let engine = EconomyEngine::new(ledger, Arc::new(content), policy);

    let token_store = Arc::new(MemoryTokenStore::new(args.token_ttl()));
    spawn_cleanup_task(Arc::clone(&token_store), TOKEN_CLEANUP_INTERVAL);
    let tokens: Arc<dyn TokenStore> = token_store;

    let (hub, hub_task) = spawn_hub(args.hub_inbox_capacity);

    let state = Arc::new(AppState::new(args, engine, tokens, hub));
    if state.args.admin.insert_admin {
        let admin = &state.args.admin;
        let deadline = Instant::now() + state.args.request_timeout();
        state
            .accounts
            .ensure_admin(
                &admin.admin_name,
                &admin.admin_email,
                admin.admin_pass.as_deref().unwrap_or_default(),
                deadline,
            )
            .await?;
    }

    // Drains connections and closes the hub before returning
    server::run(state, shutdown_signal()).await?;

    if let Err(e) = hub_task.await {
        error!("Hub task ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return std::future::pending().await;
            }
        };

        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT"),
            _ = sigterm.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C");
        }
    }
}
