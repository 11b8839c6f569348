use async_trait::async_trait;
use dashmap::DashMap;
use lenscloud_protocol::AppSetting;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// App tenancy class. STANDARD apps demand exclusive foreground tenancy
/// among themselves; SYSTEM apps ship with the cloud and may bind without a
/// pending load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    Standard,
    Background,
    System,
}

/// A voice command an app responds to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: String,
    pub phrase: String,
}

/// Catalog record for an installable app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRecord {
    pub package_name: String,
    pub name: String,
    pub kind: AppKind,
    /// Base URL of the app's server; webhooks go to `<public_url>/webhook`.
    pub public_url: String,
    pub api_key_hash: String,
    #[serde(default)]
    pub commands: Vec<Command>,
    #[serde(default)]
    pub settings: Vec<AppSetting>,
}

impl AppRecord {
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.public_url)
    }
}

pub fn hash_api_key(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn verify_api_key(key: &str, hash: &str) -> bool {
    hash_api_key(key) == hash
}

/// The app catalog. Backed by the developer portal's database in production;
/// in-memory here and in tests.
#[async_trait]
pub trait AppStore: Send + Sync + 'static {
    async fn get(&self, package_name: &str) -> Option<AppRecord>;
    async fn all(&self) -> Vec<AppRecord>;
}

#[derive(Default)]
pub struct MemoryAppStore {
    apps: DashMap<String, AppRecord>,
}

impl MemoryAppStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: AppRecord) {
        self.apps.insert(record.package_name.clone(), record);
    }
}

#[async_trait]
impl AppStore for MemoryAppStore {
    async fn get(&self, package_name: &str) -> Option<AppRecord> {
        self.apps.get(package_name).map(|e| e.value().clone())
    }

    async fn all(&self) -> Vec<AppRecord> {
        self.apps.iter().map(|e| e.value().clone()).collect()
    }
}

/// Persists per-user running-app membership. Best-effort: callers log and
/// continue on failure.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn add_running_app(&self, user_id: &str, package_name: &str) -> anyhow::Result<()>;
    async fn remove_running_app(&self, user_id: &str, package_name: &str) -> anyhow::Result<()>;
    async fn running_apps(&self, user_id: &str) -> anyhow::Result<Vec<String>>;
}

#[derive(Default)]
pub struct MemoryUserStore {
    running: DashMap<String, Vec<String>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn add_running_app(&self, user_id: &str, package_name: &str) -> anyhow::Result<()> {
        let mut apps = self.running.entry(user_id.to_string()).or_default();
        if !apps.iter().any(|p| p == package_name) {
            apps.push(package_name.to_string());
        }
        Ok(())
    }

    async fn remove_running_app(&self, user_id: &str, package_name: &str) -> anyhow::Result<()> {
        if let Some(mut apps) = self.running.get_mut(user_id) {
            apps.retain(|p| p != package_name);
        }
        Ok(())
    }

    async fn running_apps(&self, user_id: &str) -> anyhow::Result<Vec<String>> {
        Ok(self
            .running
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }
}
