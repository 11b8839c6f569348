use std::time::Duration;

use serde_json::json;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::{recv_matching, send_json};

#[tokio::test]
async fn tpa_display_request_reaches_the_glasses() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();
    let (mut tpa, composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;

    send_json(
        &mut tpa,
        &json!({
            "type": "display_event",
            "packageName": "com.example.captions",
            "sessionId": composite,
            "view": "main",
            "layout": { "layoutType": "text_wall", "text": "hello glasses" },
        }),
    )
    .await;

    let shown = recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["view"] == "main"
    })
    .await;
    assert_eq!(shown["layout"]["layoutType"], "text_wall");
    assert_eq!(shown["layout"]["text"], "hello glasses");
}

#[tokio::test]
async fn boot_screen_shows_while_loading_and_clears_on_bind() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();

    send_json(
        &mut glasses,
        &json!({ "type": "start_app", "packageName": "com.example.captions" }),
    )
    .await;

    let boot = recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["view"] == "boot"
    })
    .await;
    assert_eq!(boot["layout"]["layoutType"], "reference_card");
    assert_eq!(boot["layout"]["text"], "Captions");

    let composite = format!("{session_id}-com.example.captions");
    app.webhooks
        .wait_for(
            "session_request",
            |v| v["sessionId"] == composite.as_str(),
            Duration::from_secs(2),
        )
        .await;
    let _tpa = app
        .bind_tpa(&composite, "com.example.captions", "captions-key")
        .await;

    // Bind tears the boot screen down.
    let cleared = recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["view"] == "boot" && v["layout"]["text"] == ""
    })
    .await;
    assert_eq!(cleared["layout"]["layoutType"], "text_wall");
}

#[tokio::test]
async fn most_recent_request_wins_and_stop_recomputes() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();

    let (mut captions, captions_composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;
    let (mut assistant, assistant_composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.assistant",
            "assistant-key",
        )
        .await;

    send_json(
        &mut captions,
        &json!({
            "type": "display_event",
            "packageName": "com.example.captions",
            "sessionId": captions_composite,
            "view": "main",
            "layout": { "layoutType": "text_wall", "text": "captions layer" },
        }),
    )
    .await;
    recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["layout"]["text"] == "captions layer"
    })
    .await;

    send_json(
        &mut assistant,
        &json!({
            "type": "display_event",
            "packageName": "com.example.assistant",
            "sessionId": assistant_composite,
            "view": "main",
            "layout": { "layoutType": "text_wall", "text": "assistant layer" },
        }),
    )
    .await;
    recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["layout"]["text"] == "assistant layer"
    })
    .await;

    // Stopping the package holding the view reverts to the previous request.
    send_json(
        &mut glasses,
        &json!({ "type": "stop_app", "packageName": "com.example.assistant" }),
    )
    .await;
    let reverted = recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event"
            && v["view"] == "main"
            && v["layout"]["text"] == "captions layer"
    })
    .await;
    assert_eq!(reverted["layout"]["layoutType"], "text_wall");
}

#[tokio::test]
async fn timed_display_expires_back_to_previous_layout() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();
    let (mut tpa, composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;

    send_json(
        &mut tpa,
        &json!({
            "type": "display_event",
            "packageName": "com.example.captions",
            "sessionId": composite,
            "view": "main",
            "layout": { "layoutType": "text_wall", "text": "steady" },
        }),
    )
    .await;
    send_json(
        &mut tpa,
        &json!({
            "type": "display_event",
            "packageName": "com.example.captions",
            "sessionId": composite,
            "view": "main",
            "layout": { "layoutType": "text_wall", "text": "toast" },
            "durationMs": 200,
        }),
    )
    .await;

    recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["layout"]["text"] == "toast"
    })
    .await;

    // After durationMs the arbiter re-renders the underlying layout.
    let reverted = recv_matching(&mut glasses, Duration::from_secs(2), |v| {
        v["type"] == "display_event" && v["layout"]["text"] == "steady"
    })
    .await;
    assert_eq!(reverted["view"], "main");
}

#[tokio::test]
async fn display_requests_to_the_boot_view_are_ignored() {
    let app = TestApp::spawn().await;
    let (mut glasses, ack) = app.connect_glasses("user@example.com").await;
    let session_id = ack["sessionId"].as_str().unwrap().to_string();
    let (mut tpa, composite) = app
        .start_and_bind(
            &mut glasses,
            &session_id,
            "com.example.captions",
            "captions-key",
        )
        .await;

    send_json(
        &mut tpa,
        &json!({
            "type": "display_event",
            "packageName": "com.example.captions",
            "sessionId": composite,
            "view": "boot",
            "layout": { "layoutType": "text_wall", "text": "fake boot" },
        }),
    )
    .await;

    crate::fixtures::assert_silent(&mut glasses, "display_event", Duration::from_millis(400))
        .await;
}
