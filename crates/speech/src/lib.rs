pub mod backend;
pub mod mock;
pub mod mux;
pub mod transcript;
pub mod vad;

pub use backend::{
    AsrStreamHandle, RecognizerEvent, RecognizerResult, SpeechBackend, StreamConfig,
};
pub use mock::MockSpeechBackend;
pub use mux::{EventSink, SpeechMux};
pub use transcript::{TranscriptBuffer, TranscriptSegment};
pub use vad::{EnergyVad, VadEngine, VadGate, VadGateEvent};
