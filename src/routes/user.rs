//! Account routes: sign-up, sign-in, sign-out, rename and profile.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::Deserialize;

use super::{authenticate, json_response, read_json, request_deadline, BoxError};
use crate::error::Result;
use crate::server::http::AppState;

#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub pass: String,
}

#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub pass: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

/// POST /user/sign-up
pub async fn sign_up<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let deadline = request_deadline(state, &req);
    let body: SignUpRequest = read_json(req, state.args.max_body_bytes).await?;
    let user = state
        .accounts
        .sign_up(&body.name, &body.email, &body.pass, deadline)
        .await?;
    Ok(json_response(StatusCode::CREATED, &user))
}

/// POST /user/sign-in
pub async fn sign_in<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let deadline = request_deadline(state, &req);
    let body: SignInRequest = read_json(req, state.args.max_body_bytes).await?;
    let result = state
        .accounts
        .sign_in(&body.email, &body.pass, deadline)
        .await?;
    Ok(json_response(StatusCode::OK, &result))
}

/// PUT /user/rename
pub async fn rename<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let deadline = request_deadline(state, &req);
    let user_id = authenticate(state, req.headers()).await?;
    let body: RenameRequest = read_json(req, state.args.max_body_bytes).await?;
    let user = state.accounts.rename(user_id, &body.name, deadline).await?;
    Ok(json_response(StatusCode::OK, &user))
}

/// POST /user/sign-out
pub async fn sign_out<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>> {
    let user_id = authenticate(state, req.headers()).await?;
    state.accounts.sign_out(user_id).await?;
    Ok(json_response(StatusCode::OK, &serde_json::json!({ "signedOut": true })))
}

/// GET /user/profile
pub async fn profile<B>(state: &AppState, req: Request<B>) -> Result<Response<Full<Bytes>>> {
    let user_id = authenticate(state, req.headers()).await?;
    let profile = state.accounts.profile(user_id).await?;
    Ok(json_response(StatusCode::OK, &profile))
}
