use serde::{Deserialize, Deserializer, Serialize};

use crate::layout::Layout;
use crate::stream::StreamKey;

/// VAD status as sent by the glasses companion. Older clients send the
/// strings `"true"`/`"false"`, newer ones a JSON bool; both decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VadStatus(pub bool);

impl<'de> Deserialize<'de> for VadStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(b) => Ok(VadStatus(b)),
            serde_json::Value::String(s) => match s.as_str() {
                "true" => Ok(VadStatus(true)),
                "false" => Ok(VadStatus(false)),
                other => Err(serde::de::Error::custom(format!(
                    "invalid vad status: {other}"
                ))),
            },
            other => Err(serde::de::Error::custom(format!(
                "invalid vad status: {other}"
            ))),
        }
    }
}

/// Messages arriving on the glasses channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum GlassesMessage {
    ConnectionInit,
    StartApp {
        package_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    StopApp {
        package_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    GlassesConnectionState {
        status: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model_name: Option<String>,
    },
    Vad {
        status: VadStatus,
    },
    LocationUpdate {
        lat: f64,
        lng: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    CalendarEvent {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    HeadPosition {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    ButtonPress {
        button_id: String,
        press_type: String,
    },
    PhoneNotification {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    NotificationDismissed {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    GlassesBatteryUpdate {
        #[serde(flatten)]
        data: serde_json::Value,
    },
    PhoneBatteryUpdate {
        #[serde(flatten)]
        data: serde_json::Value,
    },
}

/// Snapshot of a user session included in acks and app-state pushes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSessionSnapshot {
    pub user_id: String,
    pub active_apps: Vec<String>,
    pub loading_apps: Vec<String>,
    pub is_transcribing: bool,
}

/// Messages sent from the cloud to the glasses channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CloudToGlassesMessage {
    ConnectionAck {
        session_id: String,
        user_session: UserSessionSnapshot,
        timestamp: u64,
    },
    ConnectionError {
        message: String,
    },
    AuthError {
        message: String,
    },
    AppStateChange {
        session_id: String,
        user_session: UserSessionSnapshot,
        timestamp: u64,
    },
    DisplayEvent {
        view: String,
        layout: Layout,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    MicrophoneStateChange {
        is_microphone_enabled: bool,
    },
}

/// Messages arriving on a TPA channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum TpaMessage {
    TpaConnectionInit {
        package_name: String,
        session_id: String,
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
    SubscriptionUpdate {
        package_name: String,
        session_id: String,
        subscriptions: Vec<StreamKey>,
    },
    DisplayEvent {
        package_name: String,
        session_id: String,
        view: String,
        layout: Layout,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

/// A single app setting delivered in the connection ack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSetting {
    pub key: String,
    pub value: serde_json::Value,
}

/// Transcription / translation payload carried in a `data_stream`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionData {
    pub text: String,
    pub is_final: bool,
    /// Seconds relative to session start.
    pub start_time: f64,
    pub end_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    pub transcribe_language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate_language: Option<String>,
}

/// Messages sent from the cloud to a TPA channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum CloudToTpaMessage {
    TpaConnectionAck {
        session_id: String,
        settings: Vec<AppSetting>,
    },
    TpaConnectionError {
        message: String,
    },
    AppStopped {
        reason: String,
    },
    SettingsUpdate {
        package_name: String,
        settings: Vec<AppSetting>,
    },
    DataStream {
        stream_type: StreamKey,
        data: serde_json::Value,
    },
    CommandActivate {
        command_id: String,
        spoken_phrase: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parameters: Option<serde_json::Value>,
        session_id: String,
    },
}
