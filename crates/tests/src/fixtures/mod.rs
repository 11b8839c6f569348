
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

pub type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

pub async fn send_json(ws: &mut Ws, value: &Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("WS send failed");
}

pub async fn send_binary(ws: &mut Ws, bytes: Vec<u8>) {
    ws.send(Message::Binary(bytes.into()))
        .await
        .expect("WS binary send failed");
}

/// Reads the next text frame as JSON, panicking after `timeout`.
pub async fn recv_json(ws: &mut Ws, timeout: Duration) -> Value {
    loop {
        let msg = tokio::time::timeout(timeout, ws.next())
            .await
            .expect("timed out waiting for WS message")
            .expect("WS stream ended")
            .expect("WS error");
        if msg.is_text() {
            return serde_json::from_str(msg.to_text().unwrap()).expect("invalid JSON frame");
        }
    }
}

/// Reads frames until one has `type == wanted`, skipping everything else.
pub async fn recv_until(ws: &mut Ws, wanted: &str, timeout: Duration) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for '{wanted}'"));
        let msg = tokio::time::timeout(remaining, ws.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for '{wanted}'"))
            .expect("WS stream ended")
            .expect("WS error");
        if msg.is_text() {
            let parsed: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            if parsed["type"] == wanted {
                return parsed;
            }
        }
    }
}

/// Reads frames until one matches the predicate.
pub async fn recv_matching(
    ws: &mut Ws,
    timeout: Duration,
    pred: impl Fn(&Value) -> bool,
) -> Value {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline
            .checked_duration_since(tokio::time::Instant::now())
            .unwrap_or_else(|| panic!("timed out waiting for matching message"));
        let msg = tokio::time::timeout(remaining, ws.next())
            .await
            .expect("timed out waiting for matching message")
            .expect("WS stream ended")
            .expect("WS error");
        if msg.is_text() {
            let parsed: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
            if pred(&parsed) {
                return parsed;
            }
        }
    }
}

/// Reads frames until a binary one arrives.
pub async fn recv_binary(ws: &mut Ws, timeout: Duration) -> Vec<u8> {
    loop {
        let msg = tokio::time::timeout(timeout, ws.next())
            .await
            .expect("timed out waiting for binary frame")
            .expect("WS stream ended")
            .expect("WS error");
        if msg.is_binary() {
            return msg.into_data().to_vec();
        }
    }
}

/// Asserts that no message with `type == unwanted` arrives within `window`.
pub async fn assert_silent(ws: &mut Ws, unwanted: &str, window: Duration) {
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = match deadline.checked_duration_since(tokio::time::Instant::now()) {
            Some(d) => d,
            None => return,
        };
        match tokio::time::timeout(remaining, ws.next()).await {
            Ok(Some(Ok(msg))) if msg.is_text() => {
                let parsed: Value = serde_json::from_str(msg.to_text().unwrap()).unwrap();
                assert_ne!(
                    parsed["type"], unwanted,
                    "unexpected '{unwanted}' message: {parsed}"
                );
            }
            Ok(Some(Ok(_))) => {}
            _ => return,
        }
    }
}
