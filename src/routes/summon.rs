//! `PUT /summon/unit`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};

use super::{authenticate, json_response, request_deadline};
use crate::error::Result;
use crate::server::http::AppState;

pub async fn unit<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>> {
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let summon = state.engine.summon_unit(user_id, deadline).await?;
    Ok(json_response(StatusCode::CREATED, &summon))
}
