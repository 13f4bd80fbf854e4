//! Liveness and build information.

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Serialize;

use super::json_response;
use crate::server::http::AppState;

const ROBOTS_TXT: &str = "User-agent: *\nDisallow: /\n";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub healthy: bool,
    pub sessions: usize,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionResponse<'a> {
    pub server: &'static str,
    pub client: &'a str,
    pub commit: &'static str,
    pub build_time: &'static str,
}

/// GET / and /health
pub fn health_check(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &HealthResponse {
            healthy: true,
            sessions: state.hub.session_count(),
            uptime_secs: state.started_at.elapsed().as_secs(),
        },
    )
}

/// GET /version
pub fn version_info(state: &AppState) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &VersionResponse {
            server: env!("CARGO_PKG_VERSION"),
            client: &state.args.client_version,
            commit: option_env!("GIT_COMMIT_SHORT").unwrap_or("unknown"),
            build_time: option_env!("BUILD_TIMESTAMP").unwrap_or("unknown"),
        },
    )
}

/// GET /robots.txt
pub fn robots() -> Response<Full<Bytes>> {
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", "text/plain")
        .body(Full::new(Bytes::from_static(ROBOTS_TXT.as_bytes())))
        .unwrap()
}
