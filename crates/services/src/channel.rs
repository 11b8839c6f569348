use lenscloud_protocol::{CloudToGlassesMessage, CloudToTpaMessage};
use tokio::sync::mpsc;

/// Bounded depth of every outbound connection queue. Non-critical streams
/// are dropped once a queue is full; control messages report the failure.
pub const OUTBOUND_QUEUE_DEPTH: usize = 256;

/// Outbound handle for a glasses connection. The WebSocket task owns the
/// sink and pumps messages from this queue.
pub type GlassesSender = mpsc::Sender<CloudToGlassesMessage>;

/// Frame bound for a TPA connection: JSON control/data messages or raw
/// binary audio for `audio_chunk` subscribers.
#[derive(Debug)]
pub enum TpaOutbound {
    Json(CloudToTpaMessage),
    Binary(Vec<u8>),
}

pub type TpaSender = mpsc::Sender<TpaOutbound>;

pub fn glasses_channel() -> (GlassesSender, mpsc::Receiver<CloudToGlassesMessage>) {
    mpsc::channel(OUTBOUND_QUEUE_DEPTH)
}

pub fn tpa_channel() -> (TpaSender, mpsc::Receiver<TpaOutbound>) {
    mpsc::channel(OUTBOUND_QUEUE_DEPTH)
}
