//! Shared fixtures for the integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use idlemon_server::auth::{MemoryTokenStore, TokenStore};
use idlemon_server::config::Args;
use idlemon_server::content::GameContent;
use idlemon_server::economy::EconomyEngine;
use idlemon_server::hub::spawn_hub;
use idlemon_server::ledger::LedgerStore;
use idlemon_server::server::handle_request;
use idlemon_server::AppState;

pub const PASSWORD: &str = "correct-horse";

pub fn test_args(extra: &[&str]) -> Args {
    let mut argv = vec!["idlemon-server", "--env", "test"];
    argv.extend_from_slice(extra);
    Args::try_parse_from(argv).unwrap()
}

pub fn engine_with(ledger: LedgerStore) -> EconomyEngine {
    let content = GameContent::default();
    let args = test_args(&[]);
    let policy = args.accrual_policy(content.accrual.clone());
    EconomyEngine::new(Arc::new(ledger), Arc::new(content), policy)
}

/// App state over an in-memory ledger with a live hub
pub fn test_state() -> Arc<AppState> {
    test_state_with(&[])
}

pub fn test_state_with(extra: &[&str]) -> Arc<AppState> {
    let args = test_args(extra);
    let engine = engine_with(LedgerStore::open_in_memory().unwrap());
    let tokens: Arc<dyn TokenStore> = Arc::new(MemoryTokenStore::new(Duration::from_secs(600)));
    let (hub, _task) = spawn_hub(args.hub_inbox_capacity);
    Arc::new(AppState::new(args, engine, tokens, hub))
}

/// A second state over the same ledger, tokens and hub, with different settings
pub fn sibling_state(state: &Arc<AppState>, extra: &[&str]) -> Arc<AppState> {
    Arc::new(AppState::new(
        test_args(extra),
        state.engine.clone(),
        Arc::clone(&state.tokens),
        state.hub.clone(),
    ))
}

/// Send one request through the router and decode the JSON reply
pub async fn call(
    state: &Arc<AppState>,
    method: Method,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth);
    }
    let body = body.map(|b| b.to_string()).unwrap_or_default();
    let req = builder.body(Full::new(Bytes::from(body))).unwrap();

    let resp = handle_request(Arc::clone(state), req).await;
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Sign up and sign in; returns the user id and a ready `Authorization` value
pub async fn signed_in(state: &Arc<AppState>, name: &str) -> (Uuid, String) {
    let email = format!("{}@example.com", name);
    let (status, _) = call(
        state,
        Method::POST,
        "/user/sign-up",
        None,
        Some(serde_json::json!({ "name": name, "email": email, "pass": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(
        state,
        Method::POST,
        "/user/sign-in",
        None,
        Some(serde_json::json!({ "email": email, "pass": PASSWORD })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let user_id: Uuid = body["userId"].as_str().unwrap().parse().unwrap();
    let token = body["token"].as_str().unwrap();
    (user_id, format!("Bearer {}:{}", user_id, token))
}
