use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::{AsrStreamHandle, RecognizerEvent, SpeechBackend, StreamConfig};

struct MockStream {
    events_tx: mpsc::Sender<RecognizerEvent>,
    audio_bytes: Arc<AtomicUsize>,
}

/// In-process speech backend for tests.
///
/// Opens a stream per language key, counts audio bytes written to each sink,
/// and lets the test drive recognizer events with `emit`.
#[derive(Clone, Default)]
pub struct MockSpeechBackend {
    streams: Arc<DashMap<String, MockStream>>,
}

impl MockSpeechBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys of currently open streams, sorted for stable assertions.
    pub fn open_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.streams.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Pushes a recognizer event into the stream for `key`. Returns false if
    /// no such stream is open (or its consumer is gone).
    pub async fn emit(&self, key: &str, event: RecognizerEvent) -> bool {
        let tx = match self.streams.get(key) {
            Some(entry) => entry.events_tx.clone(),
            None => return false,
        };
        tx.send(event).await.is_ok()
    }

    /// Total audio bytes written to the sink for `key` since it opened.
    pub fn audio_byte_count(&self, key: &str) -> usize {
        self.streams
            .get(key)
            .map(|e| e.audio_bytes.load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

#[async_trait]
impl SpeechBackend for MockSpeechBackend {
    async fn open_stream(&self, config: StreamConfig) -> anyhow::Result<AsrStreamHandle> {
        let key = config.key().to_string();
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let (events_tx, events_rx) = mpsc::channel::<RecognizerEvent>(64);
        let audio_bytes = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&audio_bytes);
        let streams = Arc::clone(&self.streams);
        let drain_key = key.clone();
        tokio::spawn(async move {
            while let Some(chunk) = audio_rx.recv().await {
                counter.fetch_add(chunk.len(), Ordering::SeqCst);
            }
            // Sink dropped: the stream was closed by the multiplexer. Only
            // prune our own entry; a replacement stream may already own the key.
            streams.remove_if(&drain_key, |_, s| Arc::ptr_eq(&s.audio_bytes, &counter));
            debug!(key = %drain_key, "mock stream closed");
        });

        self.streams.insert(
            key,
            MockStream {
                events_tx,
                audio_bytes,
            },
        );

        Ok(AsrStreamHandle {
            audio_tx,
            events_rx,
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
