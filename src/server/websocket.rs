//! WebSocket admission
//!
//! The token is checked before the protocol upgrade, so a rejected client gets
//! a plain 401 and never reaches the hub. Browsers cannot set headers on a
//! socket handshake, so `?auth=<id>:<token>` is accepted as a fallback.

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::auth;
use crate::error::GameError;
use crate::hub::serve_socket;
use crate::routes::error_response;
use crate::server::http::AppState;

#[derive(Debug, Default, Deserialize)]
struct AuthQuery {
    auth: Option<String>,
}

fn credentials<B>(req: &Request<B>) -> Option<String> {
    if let Some(header) = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return Some(header.to_string());
    }
    let query = req.uri().query()?;
    serde_urlencoded::from_str::<AuthQuery>(query).ok()?.auth
}

/// Authenticate, upgrade and hand the socket to a new hub session
pub async fn handle_upgrade<B>(state: Arc<AppState>, req: Request<B>) -> Response<Full<Bytes>> {
    let production = state.args.is_production();

    if !hyper_tungstenite::is_upgrade_request(&req) {
        return error_response(
            &GameError::Validation("expected a WebSocket upgrade request".into()),
            production,
        );
    }

    let header = credentials(&req);
    let identity = match auth::authenticate(state.tokens.as_ref(), header.as_deref()).await {
        Ok(identity) => identity,
        Err(err) => {
            warn!("WebSocket auth failed: {}", err);
            return error_response(&err, production);
        }
    };

    match hyper_tungstenite::upgrade(req, Some(state.session_config.websocket_config())) {
        Ok((response, websocket)) => {
            let hub = state.hub.clone();
            let config = state.session_config.clone();
            state.spawn_session(async move {
                match websocket.await {
                    Ok(ws) => {
                        serve_socket(ws, identity, hub, config).await;
                    }
                    Err(e) => {
                        error!(user_id = %identity, "WebSocket upgrade failed: {:?}", e);
                    }
                }
            });

            info!(user_id = %identity, "WebSocket client admitted");
            let (parts, _) = response.into_parts();
            Response::from_parts(parts, Full::new(Bytes::new()))
        }
        Err(e) => {
            error!("WebSocket upgrade error: {:?}", e);
            error_response(
                &GameError::Validation(format!("WebSocket upgrade failed: {}", e)),
                production,
            )
        }
    }
}
