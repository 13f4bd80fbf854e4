//! Router-level tests: requests go through `handle_request` without a socket.

mod common;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::StreamBody;
use hyper::body::Frame;
use hyper::{Method, Request, StatusCode};
use serde_json::json;

use idlemon_server::server::handle_request;

use common::{call, sibling_state, signed_in, test_state};

#[tokio::test]
async fn test_health_and_version() {
    let state = test_state();

    let (status, body) = call(&state, Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);

    let (status, body) = call(&state, Method::GET, "/version", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["client"], "1.0.0");
}

#[tokio::test]
async fn test_unknown_path_and_wrong_method() {
    let state = test_state();

    let (status, body) = call(&state, Method::GET, "/nowhere", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = call(&state, Method::GET, "/campaign/collect", None, None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

    let (status, _) = call(&state, Method::OPTIONS, "/campaign/collect", None, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_sign_in_returns_profile() {
    let state = test_state();
    let (user_id, auth) = signed_in(&state, "misty").await;

    let (status, body) = call(&state, Method::GET, "/user/profile", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["id"], user_id.to_string());
    assert_eq!(body["user"]["name"], "misty");
    assert!(body["user"].get("passHash").is_none());
    assert_eq!(body["campaign"]["level"], 1);
    assert_eq!(body["resources"]["gems"], 0);
}

#[tokio::test]
async fn test_bad_credentials_rejected() {
    let state = test_state();
    signed_in(&state, "brock").await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/user/sign-in",
        None,
        Some(json!({ "email": "brock@example.com", "pass": "wrong-password" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_duplicate_sign_up_conflicts() {
    let state = test_state();
    signed_in(&state, "gary").await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/user/sign-up",
        None,
        Some(json!({ "name": "gary", "email": "other@example.com", "pass": "long-enough" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFLICT");
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let state = test_state();
    let (user_id, _) = signed_in(&state, "erika").await;

    let (status, _) = call(&state, Method::PUT, "/campaign/collect", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = format!("{}:{}", user_id, "0".repeat(32));
    let (status, _) = call(&state, Method::PUT, "/campaign/collect", Some(&forged), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = call(&state, Method::GET, "/chat/messages", Some("garbage"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_collect() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "sabrina").await;

    let (status, body) = call(&state, Method::PUT, "/campaign/collect", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["level"], 1);
    assert!(body["receipts"].is_array());
    assert!(body["lastCollectedAt"].is_string());
}

#[tokio::test]
async fn test_daily_quest_then_summon() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "koga").await;

    // Nothing to spend yet
    let (status, body) = call(&state, Method::PUT, "/summon/unit", Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    // Sign-in quest was counted at sign-in
    let (status, body) =
        call(&state, Method::PUT, "/daily-quest/1/complete", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["reward"]["kind"], "gems");
    assert_eq!(body["reward"]["amount"], 100);

    let (status, body) =
        call(&state, Method::PUT, "/daily-quest/1/complete", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "already_complete");

    let (status, body) = call(&state, Method::PUT, "/summon/unit", Some(&auth), None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["debit"]["amount"], -100);
    let unit_id = body["unit"]["id"].as_i64().unwrap();
    assert_eq!(body["unit"]["locked"], false);

    let (status, body) = call(&state, Method::PUT, "/summon/unit", Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let uri = format!("/unit/{}/toggle-lock", unit_id);
    let (status, body) = call(&state, Method::PUT, &uri, Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["locked"], true);

    let (status, body) = call(&state, Method::GET, "/user/profile", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["resources"]["gems"], 0);
    assert_eq!(body["units"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_quest_rejected() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "blaine").await;

    let (status, _) =
        call(&state, Method::PUT, "/daily-quest/99/complete", Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) =
        call(&state, Method::PUT, "/daily-quest/abc/complete", Some(&auth), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_toggle_lock_of_foreign_unit_not_found() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "giovanni").await;

    let (status, _) = call(&state, Method::PUT, "/unit/12345/toggle-lock", Some(&auth), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_send_and_history() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "lorelei").await;

    for text in ["first", "second", "third"] {
        let (status, body) = call(
            &state,
            Method::POST,
            "/chat/message/send",
            Some(&auth),
            Some(json!({ "message": text })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["senderName"], "lorelei");
    }

    let (status, body) =
        call(&state, Method::GET, "/chat/messages?limit=2", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["message"], "third");
    assert_eq!(page[1]["message"], "second");

    let before = page[1]["id"].as_i64().unwrap();
    let uri = format!("/chat/messages?start={}", before);
    let (_, body) = call(&state, Method::GET, &uri, Some(&auth), None).await;
    let page = body.as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["message"], "first");
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "bruno").await;

    let (status, body) = call(
        &state,
        Method::POST,
        "/chat/message/send",
        Some(&auth),
        Some(json!({ "message": "x".repeat(600) })),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "PAYLOAD_TOO_LARGE");
}

#[tokio::test]
async fn test_rename() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "agatha").await;

    let (status, body) = call(
        &state,
        Method::PUT,
        "/user/rename",
        Some(&auth),
        Some(json!({ "name": "lance" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "lance");
}

#[tokio::test]
async fn test_sign_out_invalidates_token() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "brock").await;

    let (status, body) = call(&state, Method::POST, "/user/sign-out", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["signedOut"], true);

    let (status, _) = call(&state, Method::GET, "/user/profile", Some(&auth), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&state, Method::POST, "/user/sign-out", Some(&auth), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_slow_body_spends_request_deadline() {
    let state = test_state();
    let (_, auth) = signed_in(&state, "brock").await;
    let strict = sibling_state(&state, &["--request-timeout-ms", "200"]);

    // The body arrives after the whole request budget is gone
    let body = StreamBody::new(futures_util::stream::once(async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        Ok::<_, Infallible>(Frame::data(Bytes::from(r#"{"name":"pewter"}"#)))
    }));
    let req = Request::builder()
        .method(Method::PUT)
        .uri("/user/rename")
        .header("Authorization", &auth)
        .body(body)
        .unwrap();

    let resp = handle_request(Arc::clone(&strict), req).await;
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let (status, profile) = call(&state, Method::GET, "/user/profile", Some(&auth), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user"]["name"], "brock");
}
