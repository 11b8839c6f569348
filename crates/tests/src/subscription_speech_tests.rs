use std::time::Duration;

use lenscloud_speech::{RecognizerEvent, RecognizerResult};
use serde_json::json;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::{assert_silent, recv_until, send_json, Ws};

fn final_result(text: &str) -> RecognizerEvent {
    RecognizerEvent::Result(RecognizerResult {
        text: text.into(),
        is_final: true,
        start_time: 0.2,
        end_time: 1.4,
        speaker_id: None,
    })
}

async fn subscribe(tpa: &mut Ws, package: &str, composite: &str, subs: &[&str]) {
    send_json(
        tpa,
        &json!({
            "type": "subscription_update",
            "packageName": package,
            "sessionId": composite,
            "subscriptions": subs,
        }),
    )
    .await;
    // Let the update settle: registry replace + recognizer sync + mic update.
    tokio::time::sleep(Duration::from_millis(250)).await;
}

#[tokio::test]
async fn language_switch_moves_the_recognizer_stream() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:en-US"],
    )
    .await;
    assert_eq!(
        app.speech.open_keys(),
        vec!["transcription:en-US".to_string()]
    );

    assert!(
        app.speech
            .emit("transcription:en-US", final_result("hello world"))
            .await
    );
    let event = recv_until(&mut tpa, "data_stream", Duration::from_secs(2)).await;
    assert_eq!(event["streamType"], "transcription:en-US");
    assert_eq!(event["data"]["text"], "hello world");
    assert_eq!(event["data"]["isFinal"], true);

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:es-ES"],
    )
    .await;
    assert_eq!(
        app.speech.open_keys(),
        vec!["transcription:es-ES".to_string()]
    );

    // The old stream is gone; the new one delivers under its own key.
    assert!(
        !app.speech
            .emit("transcription:en-US", final_result("stale"))
            .await
    );
    assert!(
        app.speech
            .emit("transcription:es-ES", final_result("hola mundo"))
            .await
    );
    let event = recv_until(&mut tpa, "data_stream", Duration::from_secs(2)).await;
    assert_eq!(event["streamType"], "transcription:es-ES");
    assert_eq!(event["data"]["text"], "hola mundo");
}

#[tokio::test]
async fn recognizer_times_ride_the_session_clock() {
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

    // Subscribe well after the session started: the recognizer stream opens
    // late, so its stream-relative times must be shifted onto the session
    // clock before delivery.
    tokio::time::sleep(Duration::from_millis(900)).await;
    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:en-US"],
    )
    .await;

    app.speech
        .emit(
            "transcription:en-US",
            RecognizerEvent::Result(RecognizerResult {
                text: "late words".into(),
                is_final: true,
                start_time: 0.5,
                end_time: 1.0,
                speaker_id: None,
            }),
        )
        .await;

    let event = recv_until(&mut tpa, "data_stream", Duration::from_secs(2)).await;
    let start = event["data"]["startTime"].as_f64().unwrap();
    let end = event["data"]["endTime"].as_f64().unwrap();
    // The session had already run ~0.9s before the stream opened, so a
    // stream-relative 0.5s must land past 1.0s on the session clock.
    assert!(
        start >= 1.0,
        "startTime {start} should include the stream-open offset"
    );
    assert!(end > start);
}

#[tokio::test]
async fn translation_event_fans_out_to_both_subscribers() {
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

    subscribe(
        &mut captions,
        "com.example.captions",
        &captions_composite,
        &["translation:es-ES-to-en-US"],
    )
    .await;
    subscribe(
        &mut assistant,
        "com.example.assistant",
        &assistant_composite,
        &["translation:es-ES-to-en-US"],
    )
    .await;

    // One recognizer stream serves both subscribers.
    assert_eq!(
        app.speech.open_keys(),
        vec!["translation:es-ES-to-en-US".to_string()]
    );

    assert!(
        app.speech
            .emit("translation:es-ES-to-en-US", final_result("good morning"))
            .await
    );

    for ws in [&mut captions, &mut assistant] {
        let event = recv_until(ws, "data_stream", Duration::from_secs(2)).await;
        assert_eq!(event["streamType"], "translation:es-ES-to-en-US");
        assert_eq!(event["data"]["text"], "good morning");
        assert_eq!(event["data"]["transcribeLanguage"], "es-ES");
        assert_eq!(event["data"]["translateLanguage"], "en-US");
    }

    // Exactly one delivery each.
    assert_silent(&mut captions, "data_stream", Duration::from_millis(300)).await;
    assert_silent(&mut assistant, "data_stream", Duration::from_millis(300)).await;
}

#[tokio::test]
async fn media_subscription_drives_the_microphone() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:en-US"],
    )
    .await;

    let mic_on = recv_until(
        &mut glasses,
        "microphone_state_change",
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(mic_on["isMicrophoneEnabled"], true);

    // After the debounce settles, the pipeline is capturing.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let session = app.state.sessions.get(&session_id).unwrap();
    assert!(session.speech.is_transcribing());

    subscribe(&mut tpa, "com.example.captions", &composite, &[]).await;
    let mic_off = recv_until(
        &mut glasses,
        "microphone_state_change",
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(mic_off["isMicrophoneEnabled"], false);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!session.speech.is_transcribing());
}

#[tokio::test]
async fn non_media_subscriptions_leave_the_microphone_alone() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["button_press", "head_position"],
    )
    .await;

    assert_silent(
        &mut glasses,
        "microphone_state_change",
        Duration::from_millis(400),
    )
    .await;
}

#[tokio::test]
async fn audio_chunks_forward_to_subscribed_tpas_as_binary() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["audio_chunk"],
    )
    .await;

    crate::fixtures::send_binary(&mut glasses, vec![7, 8, 9, 10]).await;
    let bytes = crate::fixtures::recv_binary(&mut tpa, Duration::from_secs(2)).await;
    assert_eq!(bytes, vec![7, 8, 9, 10]);
}

#[tokio::test]
async fn audio_feeds_open_recognizer_sinks_once_capturing() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:en-US"],
    )
    .await;
    // Wait out the mic debounce so capture is on.
    tokio::time::sleep(Duration::from_millis(300)).await;

    crate::fixtures::send_binary(&mut glasses, vec![0u8; 640]).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(app.speech.audio_byte_count("transcription:en-US"), 640);
}

#[tokio::test]
async fn stopping_an_app_tears_down_its_streams() {
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

    subscribe(
        &mut tpa,
        "com.example.captions",
        &composite,
        &["transcription:en-US"],
    )
    .await;
    assert_eq!(app.speech.open_keys().len(), 1);

    send_json(
        &mut glasses,
        &json!({ "type": "stop_app", "packageName": "com.example.captions" }),
    )
    .await;
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(app.speech.open_keys().is_empty());
}
