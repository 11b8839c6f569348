use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::Response,
};
use futures::{SinkExt, StreamExt};
use lenscloud_protocol::{CloudToGlassesMessage, GlassesMessage};
use lenscloud_services::{auth, now_ms, router, LifecycleError, UserSession};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// Glasses channel upgrade. The bearer token may ride the `Authorization`
/// header or a `token` query parameter; verification happens after the
/// upgrade so the client receives a typed `auth_error` frame.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.to_string())
        .or(params.token);

    ws.on_upgrade(move |socket| handle_socket(socket, state, token))
}

async fn handle_socket(socket: WebSocket, state: AppState, token: Option<String>) {
    let (mut sink, mut stream) = socket.split();

    let claims = token
        .as_deref()
        .map(|t| auth::verify_glasses_token(t, &state.settings.auth.jwt_secret));
    let user_id = match claims {
        Some(Ok(claims)) => claims.email,
        Some(Err(e)) => {
            warn!(error = %e, "glasses connection rejected");
            send_direct(
                &mut sink,
                &CloudToGlassesMessage::AuthError {
                    message: e.to_string(),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
        None => {
            send_direct(
                &mut sink,
                &CloudToGlassesMessage::AuthError {
                    message: "missing bearer token".to_string(),
                },
            )
            .await;
            let _ = sink.close().await;
            return;
        }
    };

    let (tx, mut rx) = lenscloud_services::channel::glasses_channel();
    let (session, adopted) = state.sessions.create_or_adopt(&user_id, tx.clone()).await;
    info!(session_id = %session.session_id, %user_id, adopted, "glasses channel bound");

    // Outbound pump: the socket task owns the sink; everything else sends
    // through the session's bounded queue.
    let pump = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    send_ack(&session).await;
    state.sessions.mark_active(&session).await;

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_glasses_message(&state, &session, text.as_str()).await;
            }
            Ok(Message::Binary(bytes)) => {
                session.speech.feed_audio(&bytes).await;
                router::route_audio(&state.subscriptions, &session, &bytes);
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "glasses channel error");
                break;
            }
            _ => {}
        }
    }

    // A dropped channel starts the grace window, never immediate teardown.
    // Passing our own channel keeps a stale handler from disconnecting a
    // session a newer connection already adopted.
    state.sessions.mark_disconnected(&session, &tx).await;
    pump.abort();
    info!(session_id = %session.session_id, "glasses channel closed");
}

async fn send_direct(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &CloudToGlassesMessage,
) {
    if let Ok(text) = serde_json::to_string(message) {
        let _ = sink.send(Message::text(text)).await;
    }
}

async fn send_ack(session: &Arc<UserSession>) {
    let snapshot = session.snapshot().await;
    session
        .send_to_glasses(CloudToGlassesMessage::ConnectionAck {
            session_id: session.session_id.clone(),
            user_session: snapshot,
            timestamp: now_ms(),
        })
        .await;
}

async fn handle_glasses_message(state: &AppState, session: &Arc<UserSession>, text: &str) {
    let message: GlassesMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            // Protocol error: reject this message, keep the channel open.
            debug!(
                session_id = %session.session_id,
                error = %e,
                "unparseable glasses message"
            );
            return;
        }
    };

    match &message {
        GlassesMessage::ConnectionInit => {
            send_ack(session).await;
        }
        GlassesMessage::StartApp { package_name, .. } => {
            match state.lifecycle.start_app(session, package_name).await {
                Ok(composite) => {
                    debug!(session_id = %session.session_id, %composite, "app start requested");
                }
                Err(LifecycleError::AppNotFound(pkg)) => {
                    warn!(session_id = %session.session_id, package = %pkg, "app not found");
                    session
                        .send_to_glasses(CloudToGlassesMessage::ConnectionError {
                            message: format!("app not found: {pkg}"),
                        })
                        .await;
                    state.lifecycle.push_app_state(session).await;
                }
                Err(e) => {
                    warn!(session_id = %session.session_id, error = %e, "app start failed");
                    state.lifecycle.push_app_state(session).await;
                }
            }
        }
        GlassesMessage::StopApp { package_name, .. } => {
            if let Err(e) = state
                .lifecycle
                .stop_app(session, package_name, "user_requested")
                .await
            {
                warn!(session_id = %session.session_id, error = %e, "app stop failed");
            }
        }
        GlassesMessage::GlassesConnectionState { status, model_name } => {
            info!(
                session_id = %session.session_id,
                %status,
                model = model_name.as_deref().unwrap_or("unknown"),
                "glasses hardware state"
            );
        }
        GlassesMessage::LocationUpdate { lat, lng, .. } => {
            if let Ok(mut cached) = session.last_location.lock() {
                *cached = Some((*lat, *lng));
            }
            route_event(state, session, &message);
        }
        _ => route_event(state, session, &message),
    }
}

fn route_event(state: &AppState, session: &Arc<UserSession>, message: &GlassesMessage) {
    let Some(key) = router::glasses_event_key(message) else {
        return;
    };
    let Ok(payload) = serde_json::to_value(message) else {
        return;
    };
    router::deliver_data(&state.subscriptions, session, &key, payload);
}
