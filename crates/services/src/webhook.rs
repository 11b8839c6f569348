use std::time::Duration;

use serde::Serialize;
use tracing::debug;

/// Webhook bodies delivered to TPA servers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum WebhookPayload {
    /// Asks the TPA server to open a channel for a new app session.
    SessionRequest {
        session_id: String,
        user_id: String,
        timestamp: u64,
        #[serde(rename = "augmentOSWebsocketUrl")]
        augmentos_websocket_url: String,
    },
    StopRequest {
        session_id: String,
        user_id: String,
        reason: String,
    },
    /// Sent after a TPA server restart so it can re-bind live sessions.
    SessionRecovery {
        session_id: String,
        user_id: String,
        timestamp: u64,
        #[serde(rename = "augmentOSWebsocketUrl")]
        augmentos_websocket_url: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Outbound webhook dispatcher with a bounded per-call budget so a slow TPA
/// server never blocks session progression.
#[derive(Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http }
    }

    pub async fn dispatch(&self, url: &str, payload: &WebhookPayload) -> Result<(), WebhookError> {
        debug!(%url, "dispatching webhook");
        self.http
            .post(url)
            .json(payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
