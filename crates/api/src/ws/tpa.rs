use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use lenscloud_protocol::{CloudToTpaMessage, TpaMessage};
use lenscloud_services::{channel, TpaOutbound, UserSession};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// TPA channel upgrade. Authentication happens on the first frame, which
/// must be a `tpa_connection_init` arriving within the loading timeout.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    let init_deadline = state.settings.timing.tpa_load_timeout();
    let first = match tokio::time::timeout(init_deadline, stream.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(_) => {
            send_error(&mut sink, "expected tpa_connection_init").await;
            return;
        }
        Err(_) => {
            send_error(&mut sink, "tpa_connection_init timed out").await;
            return;
        }
    };

    let init: TpaMessage = match serde_json::from_str(first.as_str()) {
        Ok(m) => m,
        Err(e) => {
            send_error(&mut sink, &format!("malformed init: {e}")).await;
            return;
        }
    };
    let (package_name, composite_session_id, api_key) = match init {
        TpaMessage::TpaConnectionInit {
            package_name,
            session_id,
            api_key,
            ..
        } => (package_name, session_id, api_key),
        _ => {
            send_error(&mut sink, "first frame must be tpa_connection_init").await;
            return;
        }
    };

    let (tx, mut rx) = channel::tpa_channel();
    let bound = state
        .lifecycle
        .bind_tpa(&package_name, &composite_session_id, &api_key, tx.clone())
        .await;
    let (session, settings) = match bound {
        Ok(ok) => ok,
        Err(e) => {
            warn!(%package_name, error = %e, "TPA bind rejected");
            send_error(&mut sink, &e.to_string()).await;
            return;
        }
    };

    // Outbound pump owns the sink from here on. An `app_stopped` closes the
    // socket once it has been flushed.
    let pump = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let closing = matches!(
                frame,
                TpaOutbound::Json(CloudToTpaMessage::AppStopped { .. })
            );
            let out = match frame {
                TpaOutbound::Json(message) => match serde_json::to_string(&message) {
                    Ok(text) => Message::text(text),
                    Err(_) => continue,
                },
                TpaOutbound::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if sink.send(out).await.is_err() {
                break;
            }
            if closing {
                let _ = sink.close().await;
                break;
            }
        }
    });

    let ack = CloudToTpaMessage::TpaConnectionAck {
        session_id: composite_session_id.clone(),
        settings,
    };
    if tx.send(TpaOutbound::Json(ack)).await.is_err() {
        warn!(%package_name, "TPA channel closed before ack");
    }
    info!(
        session_id = %session.session_id,
        package = %package_name,
        "TPA channel established"
    );

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_tpa_message(&state, &session, &package_name, text.as_str()).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    package = %package_name,
                    error = %e,
                    "TPA channel error"
                );
                break;
            }
            _ => {}
        }
    }

    // Drop only this channel's binding; the app stays active so a restarted
    // TPA server can recover the session.
    session
        .app_channels
        .remove_if(&package_name, |_, sender| sender.same_channel(&tx));
    pump.abort();
    info!(
        session_id = %session.session_id,
        package = %package_name,
        "TPA channel closed"
    );
}

async fn handle_tpa_message(
    state: &AppState,
    session: &Arc<UserSession>,
    bound_package: &str,
    text: &str,
) {
    let message: TpaMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            debug!(package = %bound_package, error = %e, "unparseable TPA message");
            return;
        }
    };

    match message {
        TpaMessage::SubscriptionUpdate {
            package_name,
            subscriptions,
            ..
        } => {
            if package_name != bound_package {
                warn!(
                    claimed = %package_name,
                    bound = %bound_package,
                    "subscription update for a different package ignored"
                );
                return;
            }
            state
                .lifecycle
                .update_subscriptions(session, bound_package, subscriptions)
                .await;
        }
        TpaMessage::DisplayEvent {
            package_name,
            view,
            layout,
            duration_ms,
            ..
        } => {
            if package_name != bound_package {
                warn!(
                    claimed = %package_name,
                    bound = %bound_package,
                    "display request for a different package ignored"
                );
                return;
            }
            state
                .arbiter
                .submit(session, bound_package, &view, layout, duration_ms)
                .await;
        }
        TpaMessage::TpaConnectionInit { .. } => {
            debug!(package = %bound_package, "duplicate tpa_connection_init ignored");
        }
    }
}

async fn send_error(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    message: &str,
) {
    let error = CloudToTpaMessage::TpaConnectionError {
        message: message.to_string(),
    };
    if let Ok(text) = serde_json::to_string(&error) {
        let _ = sink.send(Message::text(text)).await;
    }
    let _ = sink.close().await;
}
