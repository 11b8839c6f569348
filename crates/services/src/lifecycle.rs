use std::sync::Arc;

use lenscloud_config::Settings;
use lenscloud_protocol::{AppSetting, CloudToGlassesMessage, CloudToTpaMessage};
use tracing::{info, warn};

use crate::channel::{TpaOutbound, TpaSender};
use crate::display::DisplayArbiter;
use crate::microphone;
use crate::now_ms;
use crate::router;
use crate::session::{SessionRegistry, UserSession};
use crate::store::{verify_api_key, AppKind, AppStore, UserStore};
use crate::subscription::SubscriptionRegistry;
use crate::webhook::{WebhookClient, WebhookPayload};

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("app not found: {0}")]
    AppNotFound(String),
    #[error("invalid API key for {0}")]
    InvalidApiKey(String),
    #[error("package {0} is not awaiting a connection")]
    NotPending(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
}

/// Controls the per-session app state machine:
/// `Idle -> Loading -> Active -> Stopping -> Idle`.
pub struct AppLifecycle {
    sessions: Arc<SessionRegistry>,
    subscriptions: Arc<SubscriptionRegistry>,
    arbiter: Arc<DisplayArbiter>,
    apps: Arc<dyn AppStore>,
    users: Arc<dyn UserStore>,
    webhooks: WebhookClient,
    settings: Arc<Settings>,
}

impl AppLifecycle {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        subscriptions: Arc<SubscriptionRegistry>,
        arbiter: Arc<DisplayArbiter>,
        apps: Arc<dyn AppStore>,
        users: Arc<dyn UserStore>,
        webhooks: WebhookClient,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            sessions,
            subscriptions,
            arbiter,
            apps,
            users,
            webhooks,
            settings,
        }
    }

    /// Starts an app session: boot screen, session-request webhook, and a
    /// hard loading timeout awaiting the TPA's bind.
    ///
    /// Returns the composite id. Starting a package that is already active
    /// or loading is a no-op returning the same id.
    pub async fn start_app(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
    ) -> Result<String, LifecycleError> {
        let composite = session.composite_id(package);

        {
            let active = session.active_apps.lock().map(|a| a.clone()).unwrap_or_default();
            let loading = session
                .loading_apps
                .lock()
                .map(|l| l.contains(package))
                .unwrap_or(false);
            if loading || active.iter().any(|p| p == package) {
                return Ok(composite);
            }
        }

        let record = self
            .apps
            .get(package)
            .await
            .ok_or_else(|| LifecycleError::AppNotFound(package.to_string()))?;

        // STANDARD apps demand exclusive foreground tenancy.
        if record.kind == AppKind::Standard {
            let active = session.active_apps.lock().map(|a| a.clone()).unwrap_or_default();
            for other in active {
                if other == package {
                    continue;
                }
                if let Some(other_record) = self.apps.get(&other).await {
                    if other_record.kind == AppKind::Standard {
                        info!(
                            session_id = %session.session_id,
                            stopping = %other,
                            starting = %package,
                            "stopping STANDARD app for exclusivity"
                        );
                        self.stop_app(session, &other, "replaced_by_standard_app")
                            .await?;
                    }
                }
            }
        }

        if let Ok(mut loading) = session.loading_apps.lock() {
            loading.insert(package.to_string());
        }
        self.arbiter
            .show_boot_screen(session, package, &record.name)
            .await;
        self.push_app_state(session).await;

        let ws_url = match record.kind {
            AppKind::System => self.settings.internal_ws_url(),
            _ => self.settings.public_ws_url(),
        };
        let payload = WebhookPayload::SessionRequest {
            session_id: composite.clone(),
            user_id: session.user_id.clone(),
            timestamp: now_ms(),
            augmentos_websocket_url: ws_url,
        };
        if let Err(e) = self.webhooks.dispatch(&record.webhook_url(), &payload).await {
            // Non-fatal: the loading timeout decides whether the start failed.
            warn!(
                session_id = %session.session_id,
                %package,
                error = %e,
                "session-request webhook failed"
            );
        }

        self.spawn_loading_timeout(session, package);
        info!(session_id = %session.session_id, %package, "app loading");
        Ok(composite)
    }

    fn spawn_loading_timeout(self: &Arc<Self>, session: &Arc<UserSession>, package: &str) {
        let lifecycle = Arc::clone(self);
        let session = Arc::clone(session);
        let package = package.to_string();
        let timeout = self.settings.timing.tpa_load_timeout();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let timed_out = session
                .loading_apps
                .lock()
                .map(|mut l| l.remove(&package))
                .unwrap_or(false);
            if timed_out {
                warn!(
                    session_id = %session.session_id,
                    %package,
                    timeout_ms = timeout.as_millis() as u64,
                    "TPA did not connect before the loading timeout"
                );
                lifecycle.arbiter.clear_boot_screen(&session, &package).await;
                lifecycle.push_app_state(&session).await;
            }
        });
    }

    /// Stops an app: subscriptions out first so no further events route,
    /// then the best-effort stop webhook, channel close, display withdrawal
    /// and mic reconciliation.
    pub async fn stop_app(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
        reason: &str,
    ) -> Result<(), LifecycleError> {
        self.subscriptions.remove_package(&session.session_id, package);
        self.sync_speech(session).await;

        if let Ok(mut active) = session.active_apps.lock() {
            active.retain(|p| p != package);
        }
        let was_loading = session
            .loading_apps
            .lock()
            .map(|mut l| l.remove(package))
            .unwrap_or(false);

        if let Some(record) = self.apps.get(package).await {
            let payload = WebhookPayload::StopRequest {
                session_id: session.composite_id(package),
                user_id: session.user_id.clone(),
                reason: reason.to_string(),
            };
            if let Err(e) = self.webhooks.dispatch(&record.webhook_url(), &payload).await {
                warn!(%package, error = %e, "stop webhook failed, continuing cleanup");
            }
        }

        if let Some((_, tx)) = session.app_channels.remove(package) {
            let stopped = TpaOutbound::Json(CloudToTpaMessage::AppStopped {
                reason: reason.to_string(),
            });
            let _ = tx.send(stopped).await;
        }

        if let Err(e) = self
            .users
            .remove_running_app(&session.user_id, package)
            .await
        {
            warn!(%package, error = %e, "failed to persist running-app removal");
        }

        self.arbiter.withdraw_package(session, package).await;
        if was_loading {
            self.arbiter.clear_boot_screen(session, package).await;
        }
        self.push_app_state(session).await;
        self.refresh_microphone(session).await;
        info!(session_id = %session.session_id, %package, %reason, "app stopped");
        Ok(())
    }

    /// Binds an inbound TPA channel to its app session.
    ///
    /// Validates the API key against the catalog record and requires a
    /// pending load (or existing active entry); SYSTEM apps may bind cold.
    pub async fn bind_tpa(
        self: &Arc<Self>,
        package: &str,
        composite_session_id: &str,
        api_key: &str,
        sender: TpaSender,
    ) -> Result<(Arc<UserSession>, Vec<AppSetting>), LifecycleError> {
        let record = self
            .apps
            .get(package)
            .await
            .ok_or_else(|| LifecycleError::AppNotFound(package.to_string()))?;

        if !verify_api_key(api_key, &record.api_key_hash) {
            return Err(LifecycleError::InvalidApiKey(package.to_string()));
        }

        let session_id = composite_session_id
            .strip_suffix(&format!("-{package}"))
            .ok_or_else(|| LifecycleError::SessionNotFound(composite_session_id.to_string()))?;
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| LifecycleError::SessionNotFound(session_id.to_string()))?;

        let was_loading = session
            .loading_apps
            .lock()
            .map(|mut l| l.remove(package))
            .unwrap_or(false);
        let is_active = session
            .active_apps
            .lock()
            .map(|a| a.iter().any(|p| p == package))
            .unwrap_or(false);

        if !was_loading && !is_active && record.kind != AppKind::System {
            return Err(LifecycleError::NotPending(package.to_string()));
        }

        if !is_active {
            if let Ok(mut active) = session.active_apps.lock() {
                active.push(package.to_string());
            }
        }
        session
            .app_channels
            .insert(package.to_string(), sender);

        if was_loading {
            self.arbiter.clear_boot_screen(&session, package).await;
        }

        if let Err(e) = self.users.add_running_app(&session.user_id, package).await {
            warn!(%package, error = %e, "failed to persist running-app membership");
        }

        self.push_app_state(&session).await;
        self.refresh_microphone(&session).await;
        info!(session_id = %session.session_id, %package, "TPA bound");
        Ok((session, record.settings.clone()))
    }

    /// Applies a subscription update: registry replace, recognizer stream
    /// reconciliation, then mic reconciliation. The diff takes effect before
    /// any later event is routed for this session.
    pub async fn update_subscriptions(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
        keys: Vec<lenscloud_protocol::StreamKey>,
    ) {
        let diff = self
            .subscriptions
            .update(&session.session_id, package, keys);
        if diff.is_empty() {
            return;
        }
        self.sync_speech(session).await;
        self.refresh_microphone(session).await;
    }

    /// Reconciles recognizer streams with the session's minimal language set.
    pub async fn sync_speech(self: &Arc<Self>, session: &Arc<UserSession>) {
        let wanted = self.subscriptions.minimal_language_set(&session.session_id);
        let sink = router::speech_sink(
            Arc::clone(&self.sessions),
            Arc::clone(&self.subscriptions),
            Arc::clone(&self.apps),
            session.session_id.clone(),
        );
        session.speech.sync_streams(&wanted, sink).await;
    }

    /// Debounced mic reconciliation, driven only when the media predicate
    /// actually flips.
    pub async fn refresh_microphone(&self, session: &Arc<UserSession>) {
        let desired = self
            .subscriptions
            .has_media_subscriptions(&session.session_id);
        let flipped = session
            .media_subscribed
            .lock()
            .map(|mut prev| {
                let changed = *prev != desired;
                *prev = desired;
                changed
            })
            .unwrap_or(false);
        if flipped {
            microphone::request_state(session, desired, self.settings.timing.mic_debounce())
                .await;
        }
    }

    /// Pushes the current app-state snapshot to the glasses.
    pub async fn push_app_state(&self, session: &Arc<UserSession>) {
        let snapshot = session.snapshot().await;
        session
            .send_to_glasses(CloudToGlassesMessage::AppStateChange {
                session_id: session.session_id.clone(),
                user_session: snapshot,
                timestamp: now_ms(),
            })
            .await;
    }
}
