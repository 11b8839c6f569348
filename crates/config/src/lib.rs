use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level settings for the LensCloud broker.
///
/// Loaded from the environment in production; tests construct a default and
/// override individual fields through `TestApp::spawn_with_settings`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub speech: SpeechSettings,
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Hostname handed to third-party apps in webhook payloads.
    pub public_host: String,
    /// Hostname handed to system apps running next to the cloud.
    pub internal_host: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HS256 secret shared with the identity provider.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Speech backend to use: "mock" or "remote".
    pub provider: String,
    pub region: Option<String>,
    pub api_key: Option<String>,
}

/// Timeouts and windows for the session core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingSettings {
    /// How long a TPA may stay in Loading before the boot screen is torn down.
    pub tpa_load_timeout_ms: u64,
    /// Grace window after a glasses disconnect before the session ends.
    pub reconnect_grace_ms: u64,
    /// Debounce window for microphone state changes.
    pub mic_debounce_ms: u64,
    /// Rolling transcript retention.
    pub transcript_retention_secs: u64,
    /// Registrations silent for longer than this are excluded from recovery.
    pub registration_dead_time_secs: u64,
    /// Budget for a single outbound webhook call.
    pub webhook_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
            public_host: "localhost:8002".to_string(),
            internal_host: "localhost:8002".to_string(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: "dev-secret".to_string(),
        }
    }
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            region: None,
            api_key: None,
        }
    }
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            tpa_load_timeout_ms: 5_000,
            reconnect_grace_ms: 60_000,
            mic_debounce_ms: 1_000,
            transcript_retention_secs: 30 * 60,
            registration_dead_time_secs: 90,
            webhook_timeout_ms: 5_000,
        }
    }
}

impl TimingSettings {
    pub fn tpa_load_timeout(&self) -> Duration {
        Duration::from_millis(self.tpa_load_timeout_ms)
    }

    pub fn reconnect_grace(&self) -> Duration {
        Duration::from_millis(self.reconnect_grace_ms)
    }

    pub fn mic_debounce(&self) -> Duration {
        Duration::from_millis(self.mic_debounce_ms)
    }

    pub fn transcript_retention(&self) -> Duration {
        Duration::from_secs(self.transcript_retention_secs)
    }

    pub fn registration_dead_time(&self) -> Duration {
        Duration::from_secs(self.registration_dead_time_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}

impl Settings {
    /// Reads settings from `LENSCLOUD_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let mut settings = Settings::default();

        if let Ok(host) = std::env::var("LENSCLOUD_HOST") {
            settings.server.host = host;
        }
        if let Ok(port) = std::env::var("LENSCLOUD_PORT") {
            if let Ok(port) = port.parse() {
                settings.server.port = port;
            }
        }
        if let Ok(host) = std::env::var("LENSCLOUD_PUBLIC_HOST") {
            settings.server.public_host = host;
        }
        if let Ok(host) = std::env::var("LENSCLOUD_INTERNAL_HOST") {
            settings.server.internal_host = host;
        }
        if let Ok(secret) = std::env::var("LENSCLOUD_JWT_SECRET") {
            settings.auth.jwt_secret = secret;
        }
        if let Ok(provider) = std::env::var("LENSCLOUD_SPEECH_PROVIDER") {
            settings.speech.provider = provider;
        }
        if let Ok(region) = std::env::var("LENSCLOUD_SPEECH_REGION") {
            settings.speech.region = Some(region);
        }
        if let Ok(key) = std::env::var("LENSCLOUD_SPEECH_KEY") {
            settings.speech.api_key = Some(key);
        }
        if let Ok(ms) = std::env::var("LENSCLOUD_TPA_LOAD_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse() {
                settings.timing.tpa_load_timeout_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("LENSCLOUD_RECONNECT_GRACE_MS") {
            if let Ok(ms) = ms.parse() {
                settings.timing.reconnect_grace_ms = ms;
            }
        }
        if let Ok(ms) = std::env::var("LENSCLOUD_MIC_DEBOUNCE_MS") {
            if let Ok(ms) = ms.parse() {
                settings.timing.mic_debounce_ms = ms;
            }
        }

        settings
    }

    /// WebSocket URL a public TPA should dial back to.
    pub fn public_ws_url(&self) -> String {
        format!("ws://{}/tpa", self.server.public_host)
    }

    /// WebSocket URL for system apps co-located with the cloud.
    pub fn internal_ws_url(&self) -> String {
        format!("ws://{}/tpa", self.server.internal_host)
    }
}
