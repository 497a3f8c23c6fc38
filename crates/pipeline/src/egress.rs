//! Audio egress
//!
//! Hands synthesized PCM to the session's outbound frame channel in
//! production order and tracks a busy window: the session is "speaking"
//! while a frame was written within the last `busy_window`. Nothing is
//! buffered across turns; once the playback worker stops writing, whatever
//! already reached the transport is allowed to finish.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::mpsc;

use voxchat_core::{protocol::Outbound, AudioChunk};

use crate::PipelineError;

/// Ordered writer of binary audio frames
#[derive(Clone)]
pub struct AudioEgress {
    out_tx: mpsc::Sender<Outbound>,
    last_write: Arc<RwLock<Option<Instant>>>,
    busy_window: Duration,
}

impl AudioEgress {
    /// Reference busy window (spec: writes within the last 250 ms).
    pub const DEFAULT_BUSY_WINDOW_MS: u64 = 250;

    pub fn new(out_tx: mpsc::Sender<Outbound>) -> Self {
        Self::with_busy_window(out_tx, Duration::from_millis(Self::DEFAULT_BUSY_WINDOW_MS))
    }

    pub fn with_busy_window(out_tx: mpsc::Sender<Outbound>, busy_window: Duration) -> Self {
        Self {
            out_tx,
            last_write: Arc::new(RwLock::new(None)),
            busy_window,
        }
    }

    /// Write one chunk; order of calls is the order on the wire.
    pub async fn write(&self, chunk: AudioChunk) -> Result<(), PipelineError> {
        let bytes = chunk.to_le_bytes();
        self.out_tx
            .send(Outbound::Audio(bytes))
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        *self.last_write.write() = Some(Instant::now());
        metrics::counter!("voxchat_egress_chunks").increment(1);
        Ok(())
    }

    /// True while audio was written within the busy window.
    pub fn is_busy(&self) -> bool {
        self.last_write
            .read()
            .map(|t| t.elapsed() < self.busy_window)
            .unwrap_or(false)
    }
}
