//! `PUT /campaign/collect`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};

use super::{authenticate, json_response, request_deadline};
use crate::error::Result;
use crate::server::http::AppState;

pub async fn collect<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>> {
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let receipt = state.engine.collect_accrual(user_id, deadline).await?;
    Ok(json_response(StatusCode::OK, &receipt))
}
