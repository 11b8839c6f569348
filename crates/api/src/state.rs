use std::sync::Arc;

use lenscloud_config::Settings;
use lenscloud_services::{
    AppLifecycle, AppStore, DisplayArbiter, SessionRegistry, SubscriptionRegistry,
    TpaRegistrationService, UserStore, WebhookClient,
};
use lenscloud_speech::SpeechBackend;

/// Process-wide wiring shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionRegistry>,
    pub subscriptions: Arc<SubscriptionRegistry>,
    pub arbiter: Arc<DisplayArbiter>,
    pub lifecycle: Arc<AppLifecycle>,
    pub registration: Arc<TpaRegistrationService>,
    pub apps: Arc<dyn AppStore>,
    pub users: Arc<dyn UserStore>,
}

impl AppState {
    /// Wires the registries together. The stores and speech backend are
    /// injectable so tests can run fully in-process.
    pub fn build(
        settings: Settings,
        apps: Arc<dyn AppStore>,
        users: Arc<dyn UserStore>,
        speech: Arc<dyn SpeechBackend>,
    ) -> Self {
        let settings = Arc::new(settings);
        let webhooks = WebhookClient::new(settings.timing.webhook_timeout());

        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let arbiter = Arc::new(DisplayArbiter::new());
        let sessions = Arc::new(SessionRegistry::new(
            settings.timing.clone(),
            speech,
            Arc::clone(&subscriptions),
            Arc::clone(&arbiter),
        ));
        let lifecycle = Arc::new(AppLifecycle::new(
            Arc::clone(&sessions),
            Arc::clone(&subscriptions),
            Arc::clone(&arbiter),
            Arc::clone(&apps),
            Arc::clone(&users),
            webhooks.clone(),
            Arc::clone(&settings),
        ));
        let registration = Arc::new(TpaRegistrationService::new(
            Arc::clone(&apps),
            Arc::clone(&sessions),
            webhooks,
            Arc::clone(&settings),
        ));

        Self {
            settings,
            sessions,
            subscriptions,
            arbiter,
            lifecycle,
            registration,
            apps,
            users,
        }
    }
}
