use std::collections::VecDeque;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One stored transcript segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    /// Stable ID correlating interim updates with their final replacement.
    pub result_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_id: Option<String>,
    pub text: String,
    pub is_final: bool,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    pub language: String,
}

/// Rolling per-session transcript.
///
/// An interim segment at the tail is replaced by the next insert (interim or
/// final); finals always append. Segments older than the retention window are
/// dropped on every insert, so the buffer never holds more than the window.
#[derive(Debug)]
pub struct TranscriptBuffer {
    segments: VecDeque<TranscriptSegment>,
    retention: Duration,
}

impl TranscriptBuffer {
    pub fn new(retention: Duration) -> Self {
        Self {
            segments: VecDeque::new(),
            retention,
        }
    }

    pub fn insert(&mut self, mut segment: TranscriptSegment) {
        // Timestamps are monotone non-decreasing.
        if let Some(tail) = self.segments.back() {
            if segment.timestamp < tail.timestamp {
                segment.timestamp = tail.timestamp;
            }
        }

        if matches!(self.segments.back(), Some(tail) if !tail.is_final) {
            self.segments.pop_back();
        }

        let horizon = segment
            .timestamp
            .saturating_sub(self.retention.as_millis() as u64);
        self.segments.push_back(segment);

        while matches!(self.segments.front(), Some(s) if s.timestamp < horizon) {
            self.segments.pop_front();
        }
    }

    pub fn segments(&self) -> impl Iterator<Item = &TranscriptSegment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
