use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lenscloud_config::Settings;
use tracing::{info, warn};
use uuid::Uuid;

use crate::now_ms;
use crate::session::SessionRegistry;
use crate::store::{verify_api_key, AppStore};
use crate::webhook::{WebhookClient, WebhookPayload};

/// One registered TPA server.
#[derive(Debug, Clone)]
pub struct TpaRegistration {
    pub registration_id: String,
    pub package_name: String,
    pub webhook_url: String,
    pub server_urls: Vec<String>,
    pub last_heartbeat: Instant,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("app not found: {0}")]
    AppNotFound(String),
    #[error("invalid API key for {0}")]
    InvalidApiKey(String),
    #[error("unknown registration: {0}")]
    Unknown(String),
}

/// Registry of TPA servers, used to recover live app sessions after a TPA
/// server restart.
pub struct TpaRegistrationService {
    entries: DashMap<String, TpaRegistration>,
    apps: Arc<dyn AppStore>,
    sessions: Arc<SessionRegistry>,
    webhooks: WebhookClient,
    settings: Arc<Settings>,
}

impl TpaRegistrationService {
    pub fn new(
        apps: Arc<dyn AppStore>,
        sessions: Arc<SessionRegistry>,
        webhooks: WebhookClient,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            apps,
            sessions,
            webhooks,
            settings,
        }
    }

    /// Registers a TPA server after verifying its API key. Idempotent per
    /// `(packageName, webhookUrl)`: re-registering refreshes the heartbeat
    /// and returns the existing id.
    pub async fn register(
        &self,
        package_name: &str,
        api_key: &str,
        webhook_url: &str,
        server_urls: Vec<String>,
    ) -> Result<String, RegistrationError> {
        let record = self
            .apps
            .get(package_name)
            .await
            .ok_or_else(|| RegistrationError::AppNotFound(package_name.to_string()))?;
        if !verify_api_key(api_key, &record.api_key_hash) {
            return Err(RegistrationError::InvalidApiKey(package_name.to_string()));
        }

        if let Some(mut existing) = self.entries.iter_mut().find(|e| {
            e.package_name == package_name && e.webhook_url == webhook_url
        }) {
            existing.last_heartbeat = Instant::now();
            existing.server_urls = server_urls;
            return Ok(existing.registration_id.clone());
        }

        let registration_id = Uuid::new_v4().to_string();
        self.entries.insert(
            registration_id.clone(),
            TpaRegistration {
                registration_id: registration_id.clone(),
                package_name: package_name.to_string(),
                webhook_url: webhook_url.to_string(),
                server_urls,
                last_heartbeat: Instant::now(),
            },
        );
        info!(%package_name, %registration_id, "TPA server registered");
        Ok(registration_id)
    }

    pub fn heartbeat(&self, registration_id: &str) -> Result<(), RegistrationError> {
        let mut entry = self
            .entries
            .get_mut(registration_id)
            .ok_or_else(|| RegistrationError::Unknown(registration_id.to_string()))?;
        entry.last_heartbeat = Instant::now();
        Ok(())
    }

    fn is_stale(&self, registration: &TpaRegistration) -> bool {
        registration.last_heartbeat.elapsed() > self.settings.timing.registration_dead_time()
    }

    /// TPA server restarted: re-sends a `session_recovery` webhook for every
    /// live session where the package is active but its channel is gone.
    /// Sessions with an open TPA channel are untouched. Returns the number
    /// of recovered sessions.
    pub async fn restart(&self, registration_id: &str) -> Result<usize, RegistrationError> {
        let registration = self
            .entries
            .get(registration_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistrationError::Unknown(registration_id.to_string()))?;

        if self.is_stale(&registration) {
            warn!(
                %registration_id,
                package = %registration.package_name,
                "stale registration excluded from recovery"
            );
            return Ok(0);
        }

        let package = &registration.package_name;
        let mut recovered = 0;
        for session in self.sessions.all() {
            if session.is_ended().await {
                continue;
            }
            let active = session
                .active_apps
                .lock()
                .map(|a| a.iter().any(|p| p == package))
                .unwrap_or(false);
            if !active {
                continue;
            }
            let channel_open = session
                .app_channels
                .get(package)
                .map(|e| !e.value().is_closed())
                .unwrap_or(false);
            if channel_open {
                continue;
            }

            let payload = WebhookPayload::SessionRecovery {
                session_id: session.composite_id(package),
                user_id: session.user_id.clone(),
                timestamp: now_ms(),
                augmentos_websocket_url: self.settings.public_ws_url(),
            };
            match self.webhooks.dispatch(&registration.webhook_url, &payload).await {
                Ok(()) => recovered += 1,
                Err(e) => warn!(
                    session_id = %session.session_id,
                    %package,
                    error = %e,
                    "session-recovery webhook failed"
                ),
            }
        }

        info!(%registration_id, %package, recovered, "restart recovery swept");
        Ok(recovered)
    }

    /// Live (non-stale) registrations for a package.
    pub fn registrations_for(&self, package_name: &str) -> Vec<TpaRegistration> {
        self.entries
            .iter()
            .filter(|e| e.package_name == package_name && !self.is_stale(e))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Time since the given registration's last heartbeat.
    pub fn heartbeat_age(&self, registration_id: &str) -> Option<Duration> {
        self.entries
            .get(registration_id)
            .map(|e| e.last_heartbeat.elapsed())
    }
}
