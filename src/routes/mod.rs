//! HTTP route handlers
//!
//! Handlers take the shared [`AppState`] and the request, and return either a
//! ready response or a [`GameError`] that the router turns into a JSON error.

pub mod campaign;
pub mod chat;
pub mod health;
pub mod quest;
pub mod summon;
pub mod unit;
pub mod user;

use std::future::Future;
use std::time::Instant;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::{HeaderMap, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use crate::auth;
use crate::error::{GameError, Result};
use crate::server::http::AppState;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Build a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| r#"{"error":"serialization failed"}"#.into());
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(json)))
        .unwrap()
}

/// Render an error, hiding details according to the environment
pub fn error_response(err: &GameError, production: bool) -> Response<Full<Bytes>> {
    if err.is_server_error() {
        error!("Request failed: {}", err);
    } else {
        warn!("Request rejected: {}", err);
    }
    json_response(
        err.status(),
        &ErrorResponse {
            error: err.public_message(production),
            code: err.code(),
        },
    )
}

/// Ledger deadline stamped on a request when the router first sees it
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Instant);

/// The stamped deadline, or one starting now for a request that bypassed the router
pub fn request_deadline<B>(state: &AppState, req: &Request<B>) -> Instant {
    req.extensions()
        .get::<Deadline>()
        .map(|deadline| deadline.0)
        .unwrap_or_else(|| state.deadline())
}

/// Resolve the caller from the `Authorization` header.
///
/// The header is copied out before the returned future runs, so the request is
/// not borrowed across the token lookup.
pub fn authenticate<'a>(state: &'a AppState, headers: &HeaderMap) -> impl Future<Output = Result<Uuid>> + 'a {
    let header = headers
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    async move { auth::authenticate(state.tokens.as_ref(), header.as_deref()).await }
}

/// Read and parse a JSON body no larger than `max_bytes`
pub async fn read_json<T, B>(req: Request<B>, max_bytes: usize) -> Result<T>
where
    T: DeserializeOwned,
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let body = Limited::new(req.into_body(), max_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                GameError::PayloadTooLarge(max_bytes)
            } else {
                GameError::Validation(format!("failed to read body: {}", e))
            }
        })?
        .to_bytes();

    serde_json::from_slice(&body).map_err(|e| GameError::Validation(format!("invalid JSON body: {}", e)))
}

/// Parse a numeric path segment
pub fn path_id(segment: &str, what: &str) -> Result<i64> {
    segment
        .parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| GameError::Validation(format!("invalid {} id: {}", what, segment)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Ping {
        value: u32,
    }

    fn request(body: &str) -> Request<Full<Bytes>> {
        Request::builder()
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_json() {
        let ping: Ping = read_json(request(r#"{"value":7}"#), 64).await.unwrap();
        assert_eq!(ping.value, 7);
    }

    #[tokio::test]
    async fn test_read_json_rejects_oversized() {
        let big = format!(r#"{{"value":1,"pad":"{}"}}"#, "x".repeat(600));
        let err = read_json::<Ping, _>(request(&big), 512).await.unwrap_err();
        assert!(matches!(err, GameError::PayloadTooLarge(512)));
    }

    #[tokio::test]
    async fn test_read_json_rejects_malformed() {
        let err = read_json::<Ping, _>(request("{"), 64).await.unwrap_err();
        assert!(matches!(err, GameError::Validation(_)));
    }

    #[test]
    fn test_path_id() {
        assert_eq!(path_id("12", "unit").unwrap(), 12);
        assert!(path_id("0", "unit").is_err());
        assert!(path_id("abc", "unit").is_err());
    }
}
