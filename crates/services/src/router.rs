use std::sync::Arc;

use lenscloud_protocol::{
    CloudToTpaMessage, GlassesMessage, StreamKey, TranscriptionData,
};
use lenscloud_speech::EventSink;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::channel::TpaOutbound;
use crate::session::{SessionRegistry, UserSession};
use crate::store::AppStore;
use crate::subscription::SubscriptionRegistry;

/// Effective subscription key for an inbound glasses event, or None for
/// control messages that are not routed.
pub fn glasses_event_key(message: &GlassesMessage) -> Option<StreamKey> {
    match message {
        GlassesMessage::ButtonPress { .. } => Some(StreamKey::ButtonPress),
        GlassesMessage::HeadPosition { .. } => Some(StreamKey::HeadPosition),
        GlassesMessage::PhoneNotification { .. } => Some(StreamKey::PhoneNotification),
        GlassesMessage::NotificationDismissed { .. } => {
            Some(StreamKey::NotificationDismissed)
        }
        GlassesMessage::Vad { .. } => Some(StreamKey::Vad),
        GlassesMessage::LocationUpdate { .. } => Some(StreamKey::LocationUpdate),
        GlassesMessage::CalendarEvent { .. } => Some(StreamKey::CalendarEvent),
        GlassesMessage::GlassesBatteryUpdate { .. } => Some(StreamKey::GlassesBattery),
        GlassesMessage::PhoneBatteryUpdate { .. } => Some(StreamKey::PhoneBattery),
        GlassesMessage::ConnectionInit
        | GlassesMessage::StartApp { .. }
        | GlassesMessage::StopApp { .. }
        | GlassesMessage::GlassesConnectionState { .. } => None,
    }
}

/// Effective delivery key for a recognizer event. Transcription payloads
/// with no language default to `en-US`.
pub fn transcription_key(data: &TranscriptionData) -> StreamKey {
    match &data.translate_language {
        Some(target) => StreamKey::translation(&data.transcribe_language, target),
        None => {
            let language = if data.transcribe_language.is_empty() {
                "en-US"
            } else {
                &data.transcribe_language
            };
            StreamKey::transcription(language)
        }
    }
}

/// Fans a JSON payload out to every subscriber of `key`, in subscription
/// order. Full queues drop the event for that TPA only; a closed channel
/// drops the binding (the TPA is treated as disconnected).
pub fn deliver_data(
    subscriptions: &SubscriptionRegistry,
    session: &UserSession,
    key: &StreamKey,
    data: serde_json::Value,
) {
    for package in subscriptions.subscribers_of(&session.session_id, key) {
        let Some(tx) = session.app_channels.get(&package).map(|e| e.value().clone())
        else {
            continue;
        };
        let msg = CloudToTpaMessage::DataStream {
            stream_type: key.clone(),
            data: data.clone(),
        };
        match tx.try_send(TpaOutbound::Json(msg)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(%package, key = %key, "TPA queue full, dropping event");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(%package, "TPA channel closed, dropping binding");
                session.app_channels.remove(&package);
            }
        }
    }
}

/// Forwards a binary audio frame to every `audio_chunk` subscriber.
pub fn route_audio(
    subscriptions: &SubscriptionRegistry,
    session: &UserSession,
    bytes: &[u8],
) {
    for package in subscriptions.subscribers_of(&session.session_id, &StreamKey::AudioChunk) {
        let Some(tx) = session.app_channels.get(&package).map(|e| e.value().clone())
        else {
            continue;
        };
        match tx.try_send(TpaOutbound::Binary(bytes.to_vec())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(%package, "TPA queue full, dropping audio frame");
            }
            Err(TrySendError::Closed(_)) => {
                session.app_channels.remove(&package);
            }
        }
    }
}

/// Scans active packages' voice commands against a final English transcript.
/// The first matching phrase per package wins; each matching package gets
/// one `command_activate`.
pub async fn match_commands(
    apps: &Arc<dyn AppStore>,
    session: &Arc<UserSession>,
    spoken: &str,
) {
    let lower = spoken.to_lowercase();
    let active = session
        .active_apps
        .lock()
        .map(|a| a.clone())
        .unwrap_or_default();

    for package in active {
        let Some(record) = apps.get(&package).await else {
            continue;
        };
        for command in &record.commands {
            if lower.contains(&command.phrase.to_lowercase()) {
                let Some(tx) =
                    session.app_channels.get(&package).map(|e| e.value().clone())
                else {
                    break;
                };
                let msg = CloudToTpaMessage::CommandActivate {
                    command_id: command.id.clone(),
                    spoken_phrase: command.phrase.clone(),
                    parameters: None,
                    session_id: session.composite_id(&package),
                };
                if tx.try_send(TpaOutbound::Json(msg)).is_err() {
                    debug!(%package, "failed to deliver command activation");
                }
                break;
            }
        }
    }
}

/// Builds the sink the speech multiplexer fans recognizer events into.
///
/// Delivery happens inline so per-TPA ordering follows recognizer order;
/// command matching runs on finals as a spawned follow-up.
pub fn speech_sink(
    sessions: Arc<SessionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    apps: Arc<dyn AppStore>,
    session_id: String,
) -> EventSink {
    Arc::new(move |_stream_key, data| {
        let Some(session) = sessions.get(&session_id) else {
            return;
        };
        let effective = transcription_key(&data);
        let payload = match serde_json::to_value(&data) {
            Ok(v) => v,
            Err(_) => return,
        };
        deliver_data(&subscriptions, &session, &effective, payload);

        let english_final = data.is_final
            && data.translate_language.is_none()
            && data.transcribe_language.starts_with("en");
        if english_final {
            let apps = Arc::clone(&apps);
            let text = data.text.clone();
            tokio::spawn(async move {
                match_commands(&apps, &session, &text).await;
            });
        }
    })
}
