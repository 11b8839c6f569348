use std::sync::Arc;
use std::time::Duration;

use lenscloud_protocol::CloudToGlassesMessage;
use tracing::debug;

use crate::session::UserSession;

/// Pending debounce record for one session's microphone state.
pub struct MicDebounce {
    desired: bool,
    last_sent: bool,
    timer: tokio::task::JoinHandle<()>,
}

/// Requests a microphone state on the glasses, collapsing rapid flips.
///
/// The first request sends immediately and opens a debounce window; requests
/// inside the window just retarget `desired` and restart the timer. When the
/// timer settles it reconciles (sending once more only if the final desired
/// state differs from what was last sent), drives the speech pipeline to
/// match, and discards the record.
pub async fn request_state(session: &Arc<UserSession>, desired: bool, window: Duration) {
    let mut slot = session.mic.lock().await;
    match slot.as_mut() {
        Some(pending) => {
            pending.desired = desired;
            pending.timer.abort();
            pending.timer = spawn_settle(session, window);
            debug!(
                session_id = %session.session_id,
                desired,
                "mic state retargeted within debounce window"
            );
        }
        None => {
            session
                .send_to_glasses(CloudToGlassesMessage::MicrophoneStateChange {
                    is_microphone_enabled: desired,
                })
                .await;
            *slot = Some(MicDebounce {
                desired,
                last_sent: desired,
                timer: spawn_settle(session, window),
            });
            debug!(session_id = %session.session_id, desired, "mic state sent");
        }
    }
}

fn spawn_settle(session: &Arc<UserSession>, window: Duration) -> tokio::task::JoinHandle<()> {
    let session = Arc::clone(session);
    tokio::spawn(async move {
        tokio::time::sleep(window).await;
        let record = session.mic.lock().await.take();
        let Some(record) = record else { return };

        let mut settled = record.last_sent;
        if record.desired != record.last_sent {
            session
                .send_to_glasses(CloudToGlassesMessage::MicrophoneStateChange {
                    is_microphone_enabled: record.desired,
                })
                .await;
            settled = record.desired;
        }

        // Capture follows the settled state unconditionally, keeping
        // subscriptions and the recognizer eventually consistent.
        if settled {
            session.speech.start_transcription();
        } else {
            session.speech.stop_transcription();
        }
        debug!(session_id = %session.session_id, settled, "mic state settled");
    })
}
