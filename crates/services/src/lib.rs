pub mod auth;
pub mod channel;
pub mod display;
pub mod lifecycle;
pub mod microphone;
pub mod registration;
pub mod router;
pub mod session;
pub mod store;
pub mod subscription;
pub mod webhook;

pub use channel::{GlassesSender, TpaOutbound, TpaSender};
pub use display::DisplayArbiter;
pub use lifecycle::{AppLifecycle, LifecycleError};
pub use registration::{TpaRegistrationService, RegistrationError};
pub use session::{SessionRegistry, SessionState, UserSession};
pub use store::{
    hash_api_key, AppKind, AppRecord, AppStore, Command, MemoryAppStore, MemoryUserStore,
    UserStore,
};
pub use subscription::{SubscriptionDiff, SubscriptionRegistry};
pub use webhook::{WebhookClient, WebhookPayload};

/// Milliseconds since the Unix epoch; used to stamp outbound messages.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
