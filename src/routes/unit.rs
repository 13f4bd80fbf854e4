//! `PUT /unit/{id}/toggle-lock`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};

use super::{authenticate, json_response, path_id, request_deadline};
use crate::error::{GameError, Result};
use crate::ledger::units;
use crate::server::http::AppState;

pub async fn toggle_lock<B>(state: &AppState, req: Request<B>, unit: &str) -> Result<Response<Full<Bytes>>> {
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let unit_id = path_id(unit, "unit")?;

    let ledger = state.engine.ledger().clone();
    let unit = tokio::task::spawn_blocking(move || {
        ledger.transaction(Some(deadline), |tx| units::toggle_lock(tx, user_id, unit_id))
    })
    .await
    .map_err(|e| GameError::Internal(format!("Unit task failed: {}", e)))??
    .ok_or_else(|| GameError::NotFound(format!("unit {}", unit_id)))?;

    Ok(json_response(StatusCode::OK, &unit))
}
