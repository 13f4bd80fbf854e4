//! HTTP server: accept loop, shared state and routing

use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::websocket;
use crate::accounts::AccountService;
use crate::auth::TokenStore;
use crate::config::Args;
use crate::economy::EconomyEngine;
use crate::error::Result;
use crate::hub::{HubHandle, SessionConfig};
use crate::routes::{self, BoxError, Deadline};

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub engine: EconomyEngine,
    pub accounts: AccountService,
    pub tokens: Arc<dyn TokenStore>,
    pub hub: HubHandle,
    pub session_config: SessionConfig,
    pub started_at: Instant,
    /// Upgraded client sockets, awaited during shutdown
    session_tasks: Mutex<JoinSet<()>>,
}

impl AppState {
    pub fn new(args: Args, engine: EconomyEngine, tokens: Arc<dyn TokenStore>, hub: HubHandle) -> Self {
        let session_config = args.session_config();
        Self {
            accounts: AccountService::new(engine.clone(), Arc::clone(&tokens)),
            args,
            engine,
            tokens,
            hub,
            session_config,
            started_at: Instant::now(),
            session_tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Run a client socket task, reaping any that have already finished
    pub fn spawn_session<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.session_tasks.lock().unwrap_or_else(PoisonError::into_inner);
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    fn take_session_tasks(&self) -> JoinSet<()> {
        std::mem::take(&mut *self.session_tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Deadline for ledger work started now on behalf of a request
    pub fn deadline(&self) -> Instant {
        Instant::now() + self.args.request_timeout()
    }
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn run<F>(state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let listener = TcpListener::bind(state.args.listen).await?;
    info!("idlemon-server listening on {}", state.args.listen);
    serve(listener, state, shutdown).await
}

/// Accept connections on `listener` until `shutdown` resolves, then drain.
///
/// Draining stops the listener, lets in-flight requests finish, closes every hub
/// session and waits for the socket tasks, all within the shutdown grace period.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let (drain_tx, drain_rx) = watch::channel(false);
    let mut connections = JoinSet::new();

    tokio::pin!(shutdown);
    loop {
        let (stream, addr) = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };
        while connections.try_join_next().is_some() {}

        let state = Arc::clone(&state);
        let mut drain = drain_rx.clone();
        connections.spawn(async move {
            let io = TokioIo::new(stream);
            let service = service_fn(move |req: Request<Incoming>| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(handle_request(state, req).await) }
            });

            let conn = http1::Builder::new()
                .serve_connection(io, service)
                .with_upgrades();
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = drain.changed() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };
            if let Err(err) = result {
                debug!("Error serving connection from {}: {:?}", addr, err);
            }
        });
    }

    drop(listener);
    info!(
        "Stopped accepting connections, draining {} in flight",
        connections.len()
    );
    let _ = drain_tx.send(true);

    let closed = state.hub.shutdown().await;
    info!("Hub stopped, closed {} client sessions", closed);

    let grace = state.args.shutdown_timeout();
    let drained = timeout(grace, async {
        while connections.join_next().await.is_some() {}
        let mut sessions = state.take_session_tasks();
        while sessions.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            "Shutdown grace period of {:?} elapsed, aborting {} connections",
            grace,
            connections.len()
        );
        connections.abort_all();
    }
    Ok(())
}

/// Route one request
pub async fn handle_request<B>(state: Arc<AppState>, mut req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    req.extensions_mut().insert(Deadline(state.deadline()));

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    debug!("{} {}", method, path);

    if method == Method::OPTIONS {
        return preflight_response();
    }

    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    let result = match (&method, segments.as_slice()) {
        (&Method::GET, [""] | ["health"]) => Ok(routes::health::health_check(&state)),
        (&Method::GET, ["version"]) => Ok(routes::health::version_info(&state)),
        (&Method::GET, ["robots.txt"]) => Ok(routes::health::robots()),
        (&Method::GET, ["ws"]) => Ok(websocket::handle_upgrade(Arc::clone(&state), req).await),

        (&Method::POST, ["user", "sign-up"]) => routes::user::sign_up(&state, req).await,
        (&Method::POST, ["user", "sign-in"]) => routes::user::sign_in(&state, req).await,
        (&Method::POST, ["user", "sign-out"]) => routes::user::sign_out(&state, req).await,
        (&Method::PUT, ["user", "rename"]) => routes::user::rename(&state, req).await,
        (&Method::GET, ["user", "profile"]) => routes::user::profile(&state, req).await,

        (&Method::PUT, ["campaign", "collect"]) => routes::campaign::collect(&state, req).await,
        (&Method::PUT, ["daily-quest", id, "complete"]) => {
            routes::quest::complete(&state, req, id).await
        }
        (&Method::PUT, ["summon", "unit"]) => routes::summon::unit(&state, req).await,
        (&Method::PUT, ["unit", id, "toggle-lock"]) => {
            routes::unit::toggle_lock(&state, req, id).await
        }

        (&Method::POST, ["chat", "message", "send"]) => routes::chat::send(&state, req).await,
        (&Method::GET, ["chat", "messages"]) => routes::chat::history(&state, req).await,

        (_, known) if is_known_route(known) => Ok(method_not_allowed_response()),
        _ => Ok(not_found_response(&path)),
    };

    result.unwrap_or_else(|err| routes::error_response(&err, state.args.is_production()))
}

fn is_known_route(segments: &[&str]) -> bool {
    matches!(
        segments,
        [""] | ["health"]
            | ["version"]
            | ["robots.txt"]
            | ["ws"]
            | ["user", "sign-up" | "sign-in" | "sign-out" | "rename" | "profile"]
            | ["campaign", "collect"]
            | ["daily-quest", _, "complete"]
            | ["summon", "unit"]
            | ["unit", _, "toggle-lock"]
            | ["chat", "message", "send"]
            | ["chat", "messages"]
    )
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header("Access-Control-Allow-Origin", "*")
        .header("Access-Control-Allow-Headers", "Authorization, Content-Type")
        .header("Access-Control-Allow-Methods", "GET, POST, PUT, OPTIONS")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn method_not_allowed_response() -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method Not Allowed", "code": "METHOD_NOT_ALLOWED" }),
    )
}

fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::NOT_FOUND,
        &serde_json::json!({ "error": "Not Found", "code": "NOT_FOUND", "path": path }),
    )
}
