use async_trait::async_trait;
use lenscloud_protocol::StreamKey;
use tokio::sync::mpsc;

/// Configuration for one recognizer stream.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// BCP-47 code of the spoken language.
    pub transcribe_language: String,
    /// Target language when this stream performs translation.
    pub translate_language: Option<String>,
    /// Sample rate of the audio fed to the sink (always 16000 here).
    pub sample_rate: u32,
}

impl StreamConfig {
    pub fn for_key(key: &StreamKey) -> Option<Self> {
        match key {
            StreamKey::Transcription { language } => Some(Self {
                transcribe_language: language.clone(),
                translate_language: None,
                sample_rate: 16_000,
            }),
            StreamKey::Translation { source, target } => Some(Self {
                transcribe_language: source.clone(),
                translate_language: Some(target.clone()),
                sample_rate: 16_000,
            }),
            _ => None,
        }
    }

    /// The stream key this configuration serves.
    pub fn key(&self) -> StreamKey {
        match &self.translate_language {
            Some(target) => StreamKey::translation(&self.transcribe_language, target),
            None => StreamKey::transcription(&self.transcribe_language),
        }
    }
}

/// A recognition result (interim or final).
#[derive(Debug, Clone)]
pub struct RecognizerResult {
    pub text: String,
    pub is_final: bool,
    /// Seconds relative to stream start.
    pub start_time: f64,
    pub end_time: f64,
    pub speaker_id: Option<String>,
}

/// Events produced by a recognizer stream.
#[derive(Debug, Clone)]
pub enum RecognizerEvent {
    Result(RecognizerResult),
    /// The provider canceled this stream. Tears down this stream only; the
    /// next subscription sync may recreate it.
    Canceled { reason: String },
}

/// An open recognizer stream: push audio in, receive events out.
///
/// Dropping `audio_tx` signals end of audio to the provider.
pub struct AsrStreamHandle {
    pub audio_tx: mpsc::Sender<Vec<u8>>,
    pub events_rx: mpsc::Receiver<RecognizerEvent>,
}

/// Pluggable speech provider.
#[async_trait]
pub trait SpeechBackend: Send + Sync + 'static {
    /// Starts a continuous-recognition stream for one language key.
    async fn open_stream(&self, config: StreamConfig) -> anyhow::Result<AsrStreamHandle>;

    /// Human-readable provider name.
    fn name(&self) -> &str;
}
