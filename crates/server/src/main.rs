use std::sync::Arc;

use lenscloud_api::state::AppState;
use lenscloud_config::Settings;
use lenscloud_services::{AppRecord, AppStore, MemoryAppStore, MemoryUserStore, UserStore};
use lenscloud_speech::{MockSpeechBackend, SpeechBackend};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);

    let apps = load_app_catalog();
    let users: Arc<dyn UserStore> = Arc::new(MemoryUserStore::new());
    let speech = build_speech_backend(&settings);

    let state = AppState::build(settings, apps, users, speech);
    let router = lenscloud_api::build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "LensCloud listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Loads the app catalog from the JSON file named by `LENSCLOUD_APPS`, or
/// starts with an empty catalog.
fn load_app_catalog() -> Arc<dyn AppStore> {
    let store = MemoryAppStore::new();
    if let Ok(path) = std::env::var("LENSCLOUD_APPS") {
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<Vec<AppRecord>>(&raw) {
                Ok(records) => {
                    info!(count = records.len(), %path, "app catalog loaded");
                    for record in records {
                        store.insert(record);
                    }
                }
                Err(e) => warn!(%path, error = %e, "invalid app catalog file"),
            },
            Err(e) => warn!(%path, error = %e, "failed to read app catalog file"),
        }
    }
    Arc::new(store)
}

fn build_speech_backend(settings: &Settings) -> Arc<dyn SpeechBackend> {
    match settings.speech.provider.as_str() {
        "mock" => Arc::new(MockSpeechBackend::new()),
        other => {
            // Remote providers plug in behind the SpeechBackend trait; until
            // one is wired, fall back to the mock so sessions still run.
            warn!(provider = %other, "unknown speech provider, using mock backend");
            Arc::new(MockSpeechBackend::new())
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
