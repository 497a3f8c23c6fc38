//! Audio ingest
//!
//! Converts inbound Int16LE PCM into normalized fixed-size `AudioFrame`s
//! with monotonic timestamps. Frames are published on a broadcast channel of
//! bounded capacity: the sender never blocks, and a consumer that falls more
//! than the capacity behind loses the oldest frames (reported by the
//! receiver as a lag, logged at WARN by the segmenter). That keeps the
//! transport reader responsive no matter how slow the pipeline runs.

use tokio::sync::broadcast;

use voxchat_core::{pcm_i16le_to_f32, AudioFrame};

/// Inbound PCM framer
pub struct AudioIngest {
    sample_rate: u32,
    frame_samples: usize,
    /// Carry-over of a partial frame between pushes
    pending: Vec<f32>,
    /// Total samples framed so far, basis for `t_start`
    samples_emitted: u64,
    tx: broadcast::Sender<AudioFrame>,
}

impl AudioIngest {
    /// Create an ingest stage emitting `frame_ms` frames at `sample_rate`.
    ///
    /// `max_frames_queue` bounds how far a consumer may lag before oldest
    /// frames are dropped.
    pub fn new(
        sample_rate: u32,
        frame_ms: u32,
        max_frames_queue: usize,
    ) -> (Self, broadcast::Receiver<AudioFrame>) {
        let (tx, rx) = broadcast::channel(max_frames_queue.max(1));
        let frame_samples = (sample_rate as usize * frame_ms as usize) / 1000;
        (
            Self {
                sample_rate,
                frame_samples: frame_samples.max(1),
                pending: Vec::new(),
                samples_emitted: 0,
                tx,
            },
            rx,
        )
    }

    /// Additional consumer handle (tests, metrics taps).
    pub fn subscribe(&self) -> broadcast::Receiver<AudioFrame> {
        self.tx.subscribe()
    }

    /// Accept one binary transport frame of Int16LE mono PCM.
    ///
    /// Returns the number of complete frames emitted.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> usize {
        self.push_samples(&pcm_i16le_to_f32(bytes))
    }

    /// Accept already-decoded samples (adapter paths, tests).
    pub fn push_samples(&mut self, samples: &[f32]) -> usize {
        self.pending.extend_from_slice(samples);

        let mut emitted = 0;
        while self.pending.len() >= self.frame_samples {
            let rest = self.pending.split_off(self.frame_samples);
            let samples = std::mem::replace(&mut self.pending, rest);

            let t_start = self.samples_emitted as f64 / self.sample_rate as f64;
            self.samples_emitted += samples.len() as u64;

            let frame = AudioFrame::new(samples, self.sample_rate, t_start);
            // No receivers means the session is tearing down; drop silently.
            let _ = self.tx.send(frame);
            emitted += 1;
        }
        emitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_are_fixed_size_and_monotonic() {
        let (mut ingest, mut rx) = AudioIngest::new(16000, 20, 256);

        // 50 ms of audio → two 20 ms frames, 10 ms pending.
        let bytes = vec![0u8; 800 * 2];
        assert_eq!(ingest.push_bytes(&bytes), 2);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.samples.len(), 320);
        assert_eq!(first.t_start, 0.0);
        assert!((second.t_start - 0.02).abs() < 1e-9);
        assert!(rx.try_recv().is_err());

        // Next push completes the pending frame.
        assert_eq!(ingest.push_bytes(&vec![0u8; 160 * 2]), 1);
        let third = rx.try_recv().unwrap();
        assert!((third.t_start - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_sub_frame_input_buffers() {
        let (mut ingest, mut rx) = AudioIngest::new(16000, 20, 256);
        assert_eq!(ingest.push_bytes(&vec![0u8; 100]), 0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_lagging_consumer_drops_oldest() {
        let (mut ingest, mut rx) = AudioIngest::new(16000, 20, 4);

        // 10 frames into a 4-frame queue.
        for _ in 0..10 {
            ingest.push_bytes(&vec![0u8; 320 * 2]);
        }

        match rx.try_recv() {
            Err(broadcast::error::TryRecvError::Lagged(n)) => assert!(n >= 6),
            other => panic!("expected lag, got {other:?}"),
        }
        // After the lag report the newest frames are still delivered.
        let frame = rx.try_recv().unwrap();
        assert!(frame.t_start > 0.0);
    }

    #[test]
    fn test_no_receiver_does_not_block() {
        let (mut ingest, rx) = AudioIngest::new(16000, 20, 4);
        drop(rx);
        // Sender side must stay non-blocking and not error out.
        assert_eq!(ingest.push_bytes(&vec![0u8; 320 * 2]), 1);
    }
}
