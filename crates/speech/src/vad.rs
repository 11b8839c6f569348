use std::collections::VecDeque;
use std::time::Duration;

/// Samples per VAD frame at 16 kHz.
pub const VAD_FRAME_SAMPLES: usize = 512;
/// One second of 16 kHz samples kept for VAD framing.
pub const VAD_RING_SAMPLES: usize = 16_000;
/// ~220 ms of audio at 10 ms per frame, replayed when speech opens.
pub const ROLLING_BUFFER_FRAMES: usize = 22;
/// Granularity at which callers should poll for state transitions.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Voice-activity decision engine fed 512-sample PCM frames.
pub trait VadEngine: Send {
    /// Whether the engine's model is loaded and usable.
    fn is_ready(&self) -> bool;

    /// Returns true when the frame contains voice.
    fn process_frame(&mut self, frame: &[i16]) -> bool;
}

/// Default engine: RMS energy threshold.
pub struct EnergyVad {
    threshold: f64,
}

impl EnergyVad {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self { threshold: 500.0 }
    }
}

impl VadEngine for EnergyVad {
    fn is_ready(&self) -> bool {
        true
    }

    fn process_frame(&mut self, frame: &[i16]) -> bool {
        if frame.is_empty() {
            return false;
        }
        let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / frame.len() as f64).sqrt() > self.threshold
    }
}

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum VadGateEvent {
    /// Speaking-state transition; send a `vad` control message upstream.
    StatusChanged(bool),
    /// An audio chunk that should be transmitted now.
    Audio(Vec<u8>),
}

/// Client-side gate deciding when audio is worth transmitting.
///
/// Audio always lands in the rolling replay buffer; it is only transmitted
/// live while `Speaking` (or when the debug bypass is set). On a
/// Silent→Speaking transition the gate emits `vad:true` followed by the
/// buffered ~220 ms prefix, so the recognizer sees the utterance onset.
pub struct VadGate {
    engine: Box<dyn VadEngine>,
    bypass: bool,
    speaking: bool,
    engine_voice: bool,
    ring: VecDeque<i16>,
    rolling: VecDeque<Vec<u8>>,
}

impl VadGate {
    pub fn new(engine: Box<dyn VadEngine>) -> Self {
        Self {
            engine,
            bypass: false,
            speaking: false,
            engine_voice: false,
            ring: VecDeque::with_capacity(VAD_RING_SAMPLES),
            rolling: VecDeque::with_capacity(ROLLING_BUFFER_FRAMES),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.engine.is_ready()
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        self.bypass = bypass;
    }

    /// Feeds one PCM chunk (16-bit LE, 16 kHz mono). Returns the audio events
    /// to transmit immediately (live passthrough while speaking or bypassed).
    pub fn ingest_audio(&mut self, chunk: &[u8]) -> Vec<VadGateEvent> {
        if !self.engine.is_ready() {
            return Vec::new();
        }

        for sample in chunk.chunks_exact(2) {
            if self.ring.len() >= VAD_RING_SAMPLES {
                self.ring.pop_front();
            }
            self.ring
                .push_back(i16::from_le_bytes([sample[0], sample[1]]));
        }

        // Consume complete frames for the engine.
        while self.ring.len() >= VAD_FRAME_SAMPLES {
            let frame: Vec<i16> = self.ring.drain(..VAD_FRAME_SAMPLES).collect();
            self.engine_voice = self.engine.process_frame(&frame);
        }

        self.rolling.push_back(chunk.to_vec());
        while self.rolling.len() > ROLLING_BUFFER_FRAMES {
            self.rolling.pop_front();
        }

        if self.bypass || self.speaking {
            vec![VadGateEvent::Audio(chunk.to_vec())]
        } else {
            Vec::new()
        }
    }

    /// Checks for a state transition; call on a `POLL_INTERVAL` cadence.
    pub fn poll(&mut self) -> Vec<VadGateEvent> {
        if self.engine_voice == self.speaking {
            return Vec::new();
        }
        self.speaking = self.engine_voice;

        let mut events = vec![VadGateEvent::StatusChanged(self.speaking)];
        if self.speaking {
            // Replay the buffered prefix before live audio resumes.
            for chunk in &self.rolling {
                events.push(VadGateEvent::Audio(chunk.clone()));
            }
        }
        events
    }
}
