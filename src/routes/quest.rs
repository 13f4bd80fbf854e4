//! `PUT /daily-quest/{id}/complete`

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};

use super::{authenticate, json_response, path_id, request_deadline};
use crate::error::Result;
use crate::server::http::AppState;

/// Every outcome is a 200; clients branch on `status`.
pub async fn complete<B>(state: &AppState, req: Request<B>, quest: &str) -> Result<Response<Full<Bytes>>> {
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let quest_id = path_id(quest, "quest")?;
    let outcome = state
        .engine
        .complete_quest(user_id, quest_id, deadline)
        .await?;
    Ok(json_response(StatusCode::OK, &outcome))
}
