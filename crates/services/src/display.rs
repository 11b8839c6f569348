use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use lenscloud_protocol::{CloudToGlassesMessage, Layout};
use tracing::{debug, warn};

use crate::session::UserSession;

/// View reserved for the loading boot screen; TPA requests to it are
/// rejected.
pub const BOOT_VIEW: &str = "boot";

#[derive(Clone)]
struct DisplayRecord {
    package: String,
    layout: Layout,
    expires_at: Option<Instant>,
    seq: u64,
}

type ViewMap = HashMap<String, Vec<DisplayRecord>>;

/// Decides which layout each glasses view shows.
///
/// The most recent non-expired request for a view wins. When a request
/// expires or its package stops, the view recomputes and re-renders (or
/// clears).
#[derive(Default)]
pub struct DisplayArbiter {
    views: DashMap<String, ViewMap>,
    seq: AtomicU64,
}

fn prune_expired(records: &mut Vec<DisplayRecord>) {
    let now = Instant::now();
    records.retain(|r| r.expires_at.map(|t| t > now).unwrap_or(true));
}

impl DisplayArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handles a TPA display request. Returns false when the request targets
    /// the reserved boot view.
    pub async fn submit(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
        view: &str,
        layout: Layout,
        duration_ms: Option<u64>,
    ) -> bool {
        if view == BOOT_VIEW {
            warn!(%package, "display request to reserved boot view rejected");
            return false;
        }
        self.record_and_show(session, package, view, layout, duration_ms)
            .await;
        true
    }

    async fn record_and_show(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
        view: &str,
        layout: Layout,
        duration_ms: Option<u64>,
    ) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let expires_at =
            duration_ms.map(|ms| Instant::now() + Duration::from_millis(ms));
        {
            let mut views = self.views.entry(session.session_id.clone()).or_default();
            let records = views.entry(view.to_string()).or_default();
            prune_expired(records);
            records.push(DisplayRecord {
                package: package.to_string(),
                layout: layout.clone(),
                expires_at,
                seq,
            });
        }

        session
            .send_to_glasses(CloudToGlassesMessage::DisplayEvent {
                view: view.to_string(),
                layout,
                duration_ms,
            })
            .await;

        if let Some(ms) = duration_ms {
            let arbiter = Arc::clone(self);
            let session = Arc::clone(session);
            let view = view.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                arbiter.expire_record(&session, &view, seq).await;
            });
        }
    }

    /// Removes an expired record; if it was the effective one, re-renders
    /// whatever is now on top (or clears the view).
    async fn expire_record(&self, session: &Arc<UserSession>, view: &str, seq: u64) {
        let next = {
            let Some(mut views) = self.views.get_mut(&session.session_id) else {
                return;
            };
            let Some(records) = views.get_mut(view) else {
                return;
            };
            let was_effective = records.last().map(|r| r.seq) == Some(seq);
            records.retain(|r| r.seq != seq);
            if !was_effective {
                return;
            }
            prune_expired(records);
            records.last().cloned()
        };

        let layout = next.map(|r| r.layout).unwrap_or_else(Layout::blank);
        debug!(session_id = %session.session_id, %view, "display request expired, re-rendering");
        session
            .send_to_glasses(CloudToGlassesMessage::DisplayEvent {
                view: view.to_string(),
                layout,
                duration_ms: None,
            })
            .await;
    }

    /// Shows the boot screen for a loading package.
    pub async fn show_boot_screen(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        package: &str,
        app_name: &str,
    ) {
        let layout = Layout::ReferenceCard {
            title: "// BOOTING //".to_string(),
            text: app_name.to_string(),
        };
        self.record_and_show(session, package, BOOT_VIEW, layout, None)
            .await;
    }

    /// Tears down a package's boot screen; clears the boot view when no
    /// other package is still loading.
    pub async fn clear_boot_screen(&self, session: &Arc<UserSession>, package: &str) {
        let next = {
            let Some(mut views) = self.views.get_mut(&session.session_id) else {
                return;
            };
            let Some(records) = views.get_mut(BOOT_VIEW) else {
                return;
            };
            let had = records.iter().any(|r| r.package == package);
            if !had {
                return;
            }
            records.retain(|r| r.package != package);
            records.last().cloned()
        };

        let layout = next.map(|r| r.layout).unwrap_or_else(Layout::blank);
        session
            .send_to_glasses(CloudToGlassesMessage::DisplayEvent {
                view: BOOT_VIEW.to_string(),
                layout,
                duration_ms: None,
            })
            .await;
    }

    /// Withdraws all of a stopped package's requests and recomputes each
    /// affected view.
    pub async fn withdraw_package(&self, session: &Arc<UserSession>, package: &str) {
        let updates: Vec<(String, Layout)> = {
            let Some(mut views) = self.views.get_mut(&session.session_id) else {
                return;
            };
            let mut updates = Vec::new();
            for (view, records) in views.iter_mut() {
                prune_expired(records);
                let was_effective =
                    records.last().map(|r| r.package == package).unwrap_or(false);
                let had = records.iter().any(|r| r.package == package);
                records.retain(|r| r.package != package);
                if had && was_effective {
                    let layout = records
                        .last()
                        .map(|r| r.layout.clone())
                        .unwrap_or_else(Layout::blank);
                    updates.push((view.clone(), layout));
                }
            }
            updates
        };

        for (view, layout) in updates {
            session
                .send_to_glasses(CloudToGlassesMessage::DisplayEvent {
                    view,
                    layout,
                    duration_ms: None,
                })
                .await;
        }
    }

    pub fn clear_session(&self, session_id: &str) {
        self.views.remove(session_id);
    }
}
