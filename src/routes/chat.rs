//! Chat routes. Sent messages are persisted, then fanned out through the hub.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{authenticate, json_response, read_json, request_deadline, BoxError};
use crate::error::{GameError, Result};
use crate::hub::{ChatMessage, Envelope, EventType};
use crate::ledger::{accounts, chat};
use crate::server::http::AppState;

pub const MAX_MESSAGE_CHARS: usize = 255;
pub const DEFAULT_PAGE: i64 = 50;
pub const MAX_PAGE: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    /// Return messages older than this id
    pub start: Option<i64>,
    pub limit: Option<i64>,
}

fn normalize_message(message: &str) -> Result<String> {
    let message = message.trim();
    let len = message.chars().count();
    if len == 0 || len > MAX_MESSAGE_CHARS {
        return Err(GameError::Validation(format!(
            "message must be 1-{} characters",
            MAX_MESSAGE_CHARS
        )));
    }
    Ok(message.to_string())
}

/// POST /chat/message/send
pub async fn send<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let body: SendRequest = read_json(req, state.args.max_body_bytes).await?;
    let message = normalize_message(&body.message)?;

    let ledger = state.engine.ledger().clone();
    let row = tokio::task::spawn_blocking(move || {
        ledger.transaction(Some(deadline), |tx| {
            let sender = accounts::get_user(tx, user_id)?
                .ok_or_else(|| GameError::NotFound(format!("user {}", user_id)))?;
            chat::insert_message(tx, user_id, &sender.name, &message, chrono::Utc::now().timestamp())
        })
    })
    .await
    .map_err(|e| GameError::Internal(format!("Chat task failed: {}", e)))??;

    let payload = ChatMessage::from(&row);
    // Already persisted; a stopped hub only costs live delivery
    match Envelope::new(EventType::ChatMessage, &payload).and_then(|e| state.hub.broadcast_event(&e)) {
        Ok(()) => debug!(message_id = row.id, "Chat message broadcast"),
        Err(e) => warn!(message_id = row.id, "Chat broadcast skipped: {}", e),
    }

    Ok(json_response(StatusCode::CREATED, &payload))
}

/// GET /chat/messages?start=&limit=
pub async fn history<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>> {
    authenticate(state, req.headers()).await?;
    let query: HistoryQuery = match req.uri().query() {
        Some(raw) => serde_urlencoded::from_str(raw)
            .map_err(|e| GameError::Validation(format!("invalid query: {}", e)))?,
        None => HistoryQuery::default(),
    };
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);

    let ledger = state.engine.ledger().clone();
    let rows = tokio::task::spawn_blocking(move || {
        ledger.read(|conn| chat::list_messages(conn, query.start, limit))
    })
    .await
    .map_err(|e| GameError::Internal(format!("Chat task failed: {}", e)))??;

    let messages: Vec<ChatMessage> = rows.iter().map(ChatMessage::from).collect();
    Ok(json_response(StatusCode::OK, &messages))
}
