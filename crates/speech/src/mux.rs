use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use lenscloud_protocol::{StreamKey, TranscriptionData};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::backend::{RecognizerEvent, SpeechBackend, StreamConfig};
use crate::transcript::{TranscriptBuffer, TranscriptSegment};

/// Receives every recognizer event after transcript bookkeeping; the caller
/// wires this to the router. Must not block (sends use bounded `try_send`).
pub type EventSink = Arc<dyn Fn(StreamKey, TranscriptionData) + Send + Sync>;

struct StreamHandle {
    audio_tx: mpsc::Sender<Vec<u8>>,
    task: tokio::task::JoinHandle<()>,
    /// Latest interim result, so a torn-down stream can emit a closing final.
    last_interim: Arc<std::sync::Mutex<Option<TranscriptionData>>>,
}

struct MuxInner {
    session_id: String,
    backend: Arc<dyn SpeechBackend>,
    streams: Mutex<HashMap<StreamKey, StreamHandle>>,
    is_transcribing: AtomicBool,
    started_at: Instant,
    transcript: Arc<Mutex<TranscriptBuffer>>,
}

/// Per-session ASR stream multiplexer.
///
/// Holds one recognizer stream per language key in the session's minimal
/// language projection and fans inbound audio bytes to every open sink.
#[derive(Clone)]
pub struct SpeechMux {
    inner: Arc<MuxInner>,
}

impl SpeechMux {
    pub fn new(
        session_id: String,
        backend: Arc<dyn SpeechBackend>,
        transcript: Arc<Mutex<TranscriptBuffer>>,
    ) -> Self {
        Self {
            inner: Arc::new(MuxInner {
                session_id,
                backend,
                streams: Mutex::new(HashMap::new()),
                is_transcribing: AtomicBool::new(false),
                started_at: Instant::now(),
                transcript,
            }),
        }
    }

    /// Reconciles open streams against the wanted language key set.
    ///
    /// After this returns, the open key set equals `wanted` minus any streams
    /// whose provider rejected the open (those retry on the next sync).
    pub async fn sync_streams(&self, wanted: &HashSet<StreamKey>, sink: EventSink) {
        let mut streams = self.inner.streams.lock().await;

        let removed: Vec<StreamKey> = streams
            .keys()
            .filter(|k| !wanted.contains(*k))
            .cloned()
            .collect();
        for key in removed {
            if let Some(handle) = streams.remove(&key) {
                handle.task.abort();
                // Close out an in-flight utterance so subscribers are not left
                // with a dangling interim.
                if let Ok(mut guard) = handle.last_interim.lock() {
                    if let Some(mut interim) = guard.take() {
                        interim.is_final = true;
                        (sink)(key.clone(), interim);
                    }
                }
                info!(session_id = %self.inner.session_id, key = %key, "ASR stream stopped");
            }
        }

        for key in wanted {
            if streams.contains_key(key) {
                continue;
            }
            let Some(config) = StreamConfig::for_key(key) else {
                continue;
            };
            match self.inner.backend.open_stream(config.clone()).await {
                Ok(handle) => {
                    let last_interim = Arc::new(std::sync::Mutex::new(None));
                    // Recognizer times are stream-relative; remember where on
                    // the session clock this stream opened.
                    let opened_at = self.elapsed_secs();
                    let task = tokio::spawn(forward_events(
                        key.clone(),
                        config,
                        opened_at,
                        handle.events_rx,
                        Arc::clone(&self.inner),
                        sink.clone(),
                        Arc::clone(&last_interim),
                    ));
                    streams.insert(
                        key.clone(),
                        StreamHandle {
                            audio_tx: handle.audio_tx,
                            task,
                            last_interim,
                        },
                    );
                    info!(session_id = %self.inner.session_id, key = %key, "ASR stream started");
                }
                Err(e) => {
                    warn!(
                        session_id = %self.inner.session_id,
                        key = %key,
                        error = %e,
                        "Failed to open ASR stream"
                    );
                }
            }
        }
    }

    /// Fans one audio chunk to every open recognizer sink. A sink with a full
    /// queue drops the chunk for that stream only.
    pub async fn feed_audio(&self, bytes: &[u8]) {
        if !self.is_transcribing() {
            return;
        }
        let streams = self.inner.streams.lock().await;
        for (key, handle) in streams.iter() {
            if handle.audio_tx.try_send(bytes.to_vec()).is_err() {
                debug!(key = %key, "ASR sink full, dropping audio chunk");
            }
        }
    }

    pub fn start_transcription(&self) {
        self.inner.is_transcribing.store(true, Ordering::SeqCst);
    }

    pub fn stop_transcription(&self) {
        self.inner.is_transcribing.store(false, Ordering::SeqCst);
    }

    pub fn is_transcribing(&self) -> bool {
        self.inner.is_transcribing.load(Ordering::SeqCst)
    }

    pub async fn active_keys(&self) -> HashSet<StreamKey> {
        self.inner.streams.lock().await.keys().cloned().collect()
    }

    /// Tears down every stream. Called when the session ends.
    pub async fn close_all(&self) {
        let mut streams = self.inner.streams.lock().await;
        for (key, handle) in streams.drain() {
            handle.task.abort();
            debug!(session_id = %self.inner.session_id, key = %key, "ASR stream closed");
        }
        self.inner.is_transcribing.store(false, Ordering::SeqCst);
    }

    /// Seconds since the session's speech clock started.
    pub fn elapsed_secs(&self) -> f64 {
        self.inner.started_at.elapsed().as_secs_f64()
    }
}

async fn forward_events(
    key: StreamKey,
    config: StreamConfig,
    opened_at: f64,
    mut events_rx: mpsc::Receiver<RecognizerEvent>,
    inner: Arc<MuxInner>,
    sink: EventSink,
    last_interim: Arc<std::sync::Mutex<Option<TranscriptionData>>>,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            RecognizerEvent::Result(result) => {
                // Shift the recognizer's stream-relative times onto the
                // session clock before anything downstream sees them.
                let data = TranscriptionData {
                    text: result.text,
                    is_final: result.is_final,
                    start_time: opened_at + result.start_time,
                    end_time: opened_at + result.end_time,
                    speaker_id: result.speaker_id,
                    transcribe_language: config.transcribe_language.clone(),
                    translate_language: config.translate_language.clone(),
                };

                if let Ok(mut guard) = last_interim.lock() {
                    if data.is_final {
                        guard.take();
                    } else {
                        *guard = Some(data.clone());
                    }
                }

                // English base transcription feeds the session transcript.
                if config.translate_language.is_none()
                    && config.transcribe_language.starts_with("en")
                {
                    let timestamp = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_millis() as u64)
                        .unwrap_or(0);
                    let segment = TranscriptSegment {
                        result_id: format!("{}:{:.3}", key, data.start_time),
                        speaker_id: data.speaker_id.clone(),
                        text: data.text.clone(),
                        is_final: data.is_final,
                        timestamp,
                        language: config.transcribe_language.clone(),
                    };
                    inner.transcript.lock().await.insert(segment);
                }

                (sink)(key.clone(), data);
            }
            RecognizerEvent::Canceled { reason } => {
                warn!(
                    session_id = %inner.session_id,
                    key = %key,
                    %reason,
                    "Recognizer canceled, tearing down stream"
                );
                inner.streams.lock().await.remove(&key);
                return;
            }
        }
    }
    debug!(session_id = %inner.session_id, key = %key, "Recognizer event channel closed");
}
