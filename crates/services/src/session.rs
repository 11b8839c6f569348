use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use lenscloud_config::TimingSettings;
use lenscloud_protocol::{CloudToGlassesMessage, CloudToTpaMessage, UserSessionSnapshot};
use lenscloud_speech::{SpeechBackend, SpeechMux, TranscriptBuffer};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{GlassesSender, TpaOutbound, TpaSender};
use crate::display::DisplayArbiter;
use crate::microphone::MicDebounce;
use crate::subscription::SubscriptionRegistry;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionState {
    Connecting,
    Active,
    Disconnected { grace_deadline: Instant },
    Ended,
}

/// Per-user session binding one glasses channel to its running apps,
/// subscriptions and speech pipeline. All mutation for a session happens on
/// the dispatcher handling that session's inbound channel.
pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub state: Mutex<SessionState>,
    glasses: Mutex<Option<GlassesSender>>,
    pub active_apps: std::sync::Mutex<Vec<String>>,
    pub loading_apps: std::sync::Mutex<HashSet<String>>,
    pub app_channels: DashMap<String, TpaSender>,
    pub speech: SpeechMux,
    pub transcript: Arc<Mutex<TranscriptBuffer>>,
    pub last_location: std::sync::Mutex<Option<(f64, f64)>>,
    /// Last value of the media-subscription predicate; mic updates fire only
    /// when it flips.
    pub(crate) media_subscribed: std::sync::Mutex<bool>,
    pub(crate) mic: Mutex<Option<MicDebounce>>,
    grace_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl UserSession {
    /// Composite id handed to a TPA: `sessionId-packageName`.
    pub fn composite_id(&self, package: &str) -> String {
        format!("{}-{}", self.session_id, package)
    }

    /// Sends a message down the glasses channel. Returns false when no
    /// channel is bound or the connection task is gone.
    pub async fn send_to_glasses(&self, message: CloudToGlassesMessage) -> bool {
        let tx = self.glasses.lock().await.clone();
        match tx {
            Some(tx) => match tx.send(message).await {
                Ok(()) => true,
                Err(_) => {
                    debug!(session_id = %self.session_id, "glasses channel closed");
                    false
                }
            },
            None => false,
        }
    }

    pub async fn snapshot(&self) -> UserSessionSnapshot {
        let active_apps = self.active_apps.lock().map(|a| a.clone()).unwrap_or_default();
        let mut loading_apps: Vec<String> = self
            .loading_apps
            .lock()
            .map(|l| l.iter().cloned().collect())
            .unwrap_or_default();
        loading_apps.sort();
        UserSessionSnapshot {
            user_id: self.user_id.clone(),
            active_apps,
            loading_apps,
            is_transcribing: self.speech.is_transcribing(),
        }
    }

    pub async fn is_ended(&self) -> bool {
        matches!(*self.state.lock().await, SessionState::Ended)
    }
}

/// Process-wide session registry.
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<UserSession>>,
    by_user: DashMap<String, String>,
    timing: TimingSettings,
    backend: Arc<dyn SpeechBackend>,
    subscriptions: Arc<SubscriptionRegistry>,
    arbiter: Arc<DisplayArbiter>,
}

impl SessionRegistry {
    pub fn new(
        timing: TimingSettings,
        backend: Arc<dyn SpeechBackend>,
        subscriptions: Arc<SubscriptionRegistry>,
        arbiter: Arc<DisplayArbiter>,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            timing,
            backend,
            subscriptions,
            arbiter,
        }
    }

    /// Binds a fresh glasses channel for `user_id`.
    ///
    /// A live session for the same user (including one inside its
    /// reconnection grace window) is adopted: the session id stays stable and
    /// active apps, recognizer streams and TPA channels are preserved.
    /// Returns `(session, adopted)`.
    pub async fn create_or_adopt(
        self: &Arc<Self>,
        user_id: &str,
        glasses: GlassesSender,
    ) -> (Arc<UserSession>, bool) {
        if let Some(existing_id) = self.by_user.get(user_id).map(|e| e.value().clone()) {
            if let Some(session) = self.get(&existing_id) {
                let mut state = session.state.lock().await;
                if !matches!(*state, SessionState::Ended) {
                    *state = SessionState::Active;
                    drop(state);
                    if let Some(task) = session.grace_task.lock().await.take() {
                        task.abort();
                    }
                    *session.glasses.lock().await = Some(glasses);
                    info!(
                        session_id = %session.session_id,
                        %user_id,
                        "glasses reconnected, session adopted"
                    );
                    return (session, true);
                }
            }
        }

        let session_id = Uuid::new_v4().to_string();
        let transcript = Arc::new(Mutex::new(TranscriptBuffer::new(
            self.timing.transcript_retention(),
        )));
        let session = Arc::new(UserSession {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            state: Mutex::new(SessionState::Connecting),
            glasses: Mutex::new(Some(glasses)),
            active_apps: std::sync::Mutex::new(Vec::new()),
            loading_apps: std::sync::Mutex::new(HashSet::new()),
            app_channels: DashMap::new(),
            speech: SpeechMux::new(
                session_id.clone(),
                Arc::clone(&self.backend),
                Arc::clone(&transcript),
            ),
            transcript,
            last_location: std::sync::Mutex::new(None),
            media_subscribed: std::sync::Mutex::new(false),
            mic: Mutex::new(None),
            grace_task: Mutex::new(None),
        });

        self.sessions.insert(session_id.clone(), Arc::clone(&session));
        self.by_user.insert(user_id.to_string(), session_id.clone());
        info!(%session_id, %user_id, "session created");
        (session, false)
    }

    /// Never blocks; lock-free snapshot lookup.
    pub fn get(&self, session_id: &str) -> Option<Arc<UserSession>> {
        self.sessions.get(session_id).map(|e| Arc::clone(e.value()))
    }

    pub fn all(&self) -> Vec<Arc<UserSession>> {
        self.sessions.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub async fn mark_active(&self, session: &Arc<UserSession>) {
        let mut state = session.state.lock().await;
        if !matches!(*state, SessionState::Ended) {
            *state = SessionState::Active;
        }
    }

    /// Glasses channel dropped or errored. Starts the reconnection grace
    /// window; the session only ends if the glasses stay away past it.
    ///
    /// `channel` identifies the connection reporting the drop: a stale
    /// handler whose session was already adopted by a newer connection is a
    /// no-op.
    pub async fn mark_disconnected(
        self: &Arc<Self>,
        session: &Arc<UserSession>,
        channel: &GlassesSender,
    ) {
        {
            let mut glasses = session.glasses.lock().await;
            match glasses.as_ref() {
                Some(current) if current.same_channel(channel) => *glasses = None,
                _ => return,
            }
        }
        {
            let mut state = session.state.lock().await;
            if matches!(*state, SessionState::Ended) {
                return;
            }
            *state = SessionState::Disconnected {
                grace_deadline: Instant::now() + self.timing.reconnect_grace(),
            };
        }
        info!(
            session_id = %session.session_id,
            grace_ms = self.timing.reconnect_grace_ms,
            "glasses disconnected, grace window started"
        );

        let registry = Arc::clone(self);
        let sess = Arc::clone(session);
        let grace = self.timing.reconnect_grace();
        let task = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let expired = matches!(
                *sess.state.lock().await,
                SessionState::Disconnected { .. }
            );
            if expired {
                // Detach our own handle first so end_session's abort of the
                // grace task cannot cancel the running teardown.
                sess.grace_task.lock().await.take();
                info!(session_id = %sess.session_id, "grace window expired");
                registry.end_session(&sess).await;
            }
        });
        if let Some(old) = session.grace_task.lock().await.replace(task) {
            old.abort();
        }
    }

    /// Terminal teardown: closes every TPA channel, stops every recognizer
    /// stream, and evicts the session. Idempotent.
    pub async fn end_session(&self, session: &Arc<UserSession>) {
        {
            let mut state = session.state.lock().await;
            if matches!(*state, SessionState::Ended) {
                return;
            }
            *state = SessionState::Ended;
        }

        if let Some(task) = session.grace_task.lock().await.take() {
            task.abort();
        }

        let channels: Vec<(String, TpaSender)> = session
            .app_channels
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        session.app_channels.clear();
        for (package, tx) in channels {
            let stopped = TpaOutbound::Json(CloudToTpaMessage::AppStopped {
                reason: "session_ended".to_string(),
            });
            if tx.send(stopped).await.is_err() {
                warn!(
                    session_id = %session.session_id,
                    %package,
                    "TPA channel already closed during session end"
                );
            }
        }

        session.speech.close_all().await;
        self.subscriptions.remove_session(&session.session_id);
        self.arbiter.clear_session(&session.session_id);

        self.sessions.remove(&session.session_id);
        // Only unmap the user if no newer session replaced this one.
        if let Some(entry) = self.by_user.get(&session.user_id) {
            if entry.value() == &session.session_id {
                drop(entry);
                self.by_user.remove(&session.user_id);
            }
        }
        info!(session_id = %session.session_id, "session ended");
    }
}
