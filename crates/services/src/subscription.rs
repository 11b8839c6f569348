use std::collections::HashSet;

use dashmap::DashMap;
use lenscloud_protocol::StreamKey;
use tracing::debug;

#[derive(Debug, Clone)]
struct PackageSubscriptions {
    package: String,
    keys: Vec<StreamKey>,
}

/// Result of a subscription update: what this package gained and lost.
#[derive(Debug, Default, PartialEq)]
pub struct SubscriptionDiff {
    pub added: Vec<StreamKey>,
    pub removed: Vec<StreamKey>,
}

impl SubscriptionDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Authoritative `(session, package) -> stream keys` index.
///
/// Reads are lock-free snapshots; writes are serialized per session through
/// the map entry. Package order within a session is insertion order, which
/// fixes fan-out delivery order.
#[derive(Default)]
pub struct SubscriptionRegistry {
    sessions: DashMap<String, Vec<PackageSubscriptions>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replaces the key set for `(session, package)`.
    ///
    /// Re-sending the same set is a no-op and returns an empty diff.
    pub fn update(
        &self,
        session_id: &str,
        package: &str,
        keys: Vec<StreamKey>,
    ) -> SubscriptionDiff {
        let mut deduped: Vec<StreamKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if !deduped.contains(&key) {
                deduped.push(key);
            }
        }

        let mut entry = self.sessions.entry(session_id.to_string()).or_default();
        let slot = entry.iter_mut().find(|p| p.package == package);

        let diff = match slot {
            Some(slot) => {
                let added: Vec<StreamKey> = deduped
                    .iter()
                    .filter(|k| !slot.keys.contains(k))
                    .cloned()
                    .collect();
                let removed: Vec<StreamKey> = slot
                    .keys
                    .iter()
                    .filter(|k| !deduped.contains(k))
                    .cloned()
                    .collect();
                slot.keys = deduped;
                SubscriptionDiff { added, removed }
            }
            None => {
                let added = deduped.clone();
                entry.push(PackageSubscriptions {
                    package: package.to_string(),
                    keys: deduped,
                });
                SubscriptionDiff {
                    added,
                    removed: Vec::new(),
                }
            }
        };

        if !diff.is_empty() {
            debug!(
                %session_id,
                %package,
                added = diff.added.len(),
                removed = diff.removed.len(),
                "subscriptions updated"
            );
        }
        diff
    }

    pub fn keys_of(&self, session_id: &str, package: &str) -> Vec<StreamKey> {
        self.sessions
            .get(session_id)
            .and_then(|packages| {
                packages
                    .iter()
                    .find(|p| p.package == package)
                    .map(|p| p.keys.clone())
            })
            .unwrap_or_default()
    }

    /// Packages subscribed to `key`, in package insertion order.
    pub fn subscribers_of(&self, session_id: &str, key: &StreamKey) -> Vec<String> {
        self.sessions
            .get(session_id)
            .map(|packages| {
                packages
                    .iter()
                    .filter(|p| p.keys.contains(key))
                    .map(|p| p.package.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Union of all language-parameterized keys in this session — the
    /// minimal set of recognizer streams the speech pipeline must hold.
    pub fn minimal_language_set(&self, session_id: &str) -> HashSet<StreamKey> {
        self.sessions
            .get(session_id)
            .map(|packages| {
                packages
                    .iter()
                    .flat_map(|p| p.keys.iter())
                    .filter(|k| k.is_language_stream())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// True iff any package in this session subscribes to a stream that
    /// requires microphone capture.
    pub fn has_media_subscriptions(&self, session_id: &str) -> bool {
        self.sessions
            .get(session_id)
            .map(|packages| {
                packages
                    .iter()
                    .any(|p| p.keys.iter().any(|k| k.requires_microphone()))
            })
            .unwrap_or(false)
    }

    /// Drops all of one package's entries; returns the removed keys.
    pub fn remove_package(&self, session_id: &str, package: &str) -> Vec<StreamKey> {
        let mut removed = Vec::new();
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if let Some(pos) = entry.iter().position(|p| p.package == package) {
                removed = entry.remove(pos).keys;
            }
        }
        removed
    }

    pub fn remove_session(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}
