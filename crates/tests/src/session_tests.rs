use std::time::Duration;

use serde_json::json;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::{recv_until, send_json};

#[tokio::test]
async fn connect_receives_connection_ack() {
    let app = TestApp::spawn().await;
    let (_ws, ack) = app.connect_glasses("user@example.com").await;

    assert!(ack["sessionId"].as_str().unwrap().len() > 10);
    assert_eq!(ack["userSession"]["userId"], "user@example.com");
    assert_eq!(ack["userSession"]["activeApps"].as_array().unwrap().len(), 0);
    assert_eq!(ack["userSession"]["isTranscribing"], false);
}

#[tokio::test]
async fn invalid_token_receives_auth_error() {
    let app = TestApp::spawn().await;
    let mut ws = app.connect_glasses_raw("garbage-token").await;
    let err = recv_until(&mut ws, "auth_error", Duration::from_secs(2)).await;
    assert!(err["message"].as_str().unwrap().contains("invalid token"));
}

#[tokio::test]
async fn missing_token_receives_auth_error() {
    let app = TestApp::spawn().await;
    let url = format!("ws://{}/glasses", app.addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let err = recv_until(&mut ws, "auth_error", Duration::from_secs(2)).await;
    assert_eq!(err["message"], "missing bearer token");
}

#[tokio::test]
async fn connection_init_is_acked_again() {
    let app = TestApp::spawn().await;
    let (mut ws, first) = app.connect_glasses("user@example.com").await;

    send_json(&mut ws, &json!({ "type": "connection_init" })).await;
    let second = recv_until(&mut ws, "connection_ack", Duration::from_secs(2)).await;
    assert_eq!(second["sessionId"], first["sessionId"]);
}

#[tokio::test]
async fn reconnect_within_grace_adopts_the_session() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();

    // Start an app so the adopted session has state worth preserving.
    let (_tpa, _composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;

    drop(glasses);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let (_glasses2, ack2) = app.connect_glasses("user@example.com").await;
    assert_eq!(ack2["sessionId"], session_id.as_str());
    let active = ack2["userSession"]["activeApps"].as_array().unwrap();
    assert!(active.iter().any(|v| v == "com.example.captions"));
}

#[tokio::test]
async fn reconnect_after_grace_starts_a_fresh_session() {
    let app = TestApp::spawn_with_settings(|s| {
        s.timing.reconnect_grace_ms = 200;
    })
    .await;
    let (glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();

    drop(glasses);
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert!(app.state.sessions.get(&session_id).is_none());

    let (_glasses2, ack2) = app.connect_glasses("user@example.com").await;
    assert_ne!(ack2["sessionId"], session_id.as_str());
}

#[tokio::test]
async fn grace_expiry_notifies_bound_tpas() {
    let app = TestApp::spawn_with_settings(|s| {
        s.timing.reconnect_grace_ms = 200;
    })
    .await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();

    let (mut tpa, _) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;

    drop(glasses);
    let stopped = recv_until(&mut tpa, "app_stopped", Duration::from_secs(3)).await;
    assert_eq!(stopped["reason"], "session_ended");
}

#[tokio::test]
async fn two_users_get_distinct_sessions() {
    let app = TestApp::spawn().await;
    let (_ws_a, ack_a) = app.connect_glasses("alice@example.com").await;
    let (_ws_b, ack_b) = app.connect_glasses("bob@example.com").await;
    assert_ne!(ack_a["sessionId"], ack_b["sessionId"]);
    assert_eq!(app.state.sessions.session_count(), 2);
}
