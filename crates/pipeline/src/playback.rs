//! TTS playback worker
//!
//! Single consumer of the session's TTS queue. Each `Speak` item carries the
//! cancel guard of the turn that enqueued it: a cancelled item is discarded
//! on dequeue, so after an interrupt the queue drains to clean state without
//! the worker restarting. Mid-synthesis cancellation stops pulling from the
//! adapter within one chunk and tapers the output with a short fade.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use voxchat_core::{fade_in, fade_out, pcm_f32_to_i16, AudioChunk, CancelGuard, TextToSpeech, TtsRequest};

use crate::egress::AudioEgress;
use crate::PipelineError;

/// Fade length applied at chunk starts and interruption (spec: ≤20 ms).
const FADE_MS: u64 = 20;

/// One queue entry
pub enum QueueItem {
    Speak(TtsRequest, CancelGuard),
    /// Ack once everything enqueued before it was handed to egress
    Flush(oneshot::Sender<()>),
}

/// Producer handle to the playback queue
#[derive(Clone)]
pub struct PlaybackQueue {
    tx: mpsc::Sender<QueueItem>,
}

impl PlaybackQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueueItem>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue one speakable chunk for the turn guarded by `guard`.
    pub async fn speak(&self, request: TtsRequest, guard: CancelGuard) -> Result<(), PipelineError> {
        self.tx
            .send(QueueItem::Speak(request, guard))
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Enqueue a flush marker; the returned receiver resolves when every
    /// item ahead of it has been processed or discarded.
    pub async fn flush(&self) -> Result<oneshot::Receiver<()>, PipelineError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(QueueItem::Flush(ack_tx))
            .await
            .map_err(|_| PipelineError::ChannelClosed)?;
        Ok(ack_rx)
    }
}

/// The queue consumer
pub struct PlaybackWorker {
    tts: Arc<dyn TextToSpeech>,
    egress: AudioEgress,
    sample_rate_out: u32,
    chunk_timeout: Duration,
}

impl PlaybackWorker {
    pub fn new(
        tts: Arc<dyn TextToSpeech>,
        egress: AudioEgress,
        sample_rate_out: u32,
        chunk_timeout_s: u64,
    ) -> Self {
        Self {
            tts,
            egress,
            sample_rate_out,
            chunk_timeout: Duration::from_secs(chunk_timeout_s.max(1)),
        }
    }

    /// Process queue items until every producer handle is dropped.
    pub async fn run(self, mut rx: mpsc::Receiver<QueueItem>) {
        while let Some(item) = rx.recv().await {
            match item {
                QueueItem::Flush(ack) => {
                    let _ = ack.send(());
                }
                QueueItem::Speak(request, guard) => {
                    if guard.is_cancelled() {
                        tracing::debug!(msg_id = %request.msg_id, "dropping cancelled tts request");
                        continue;
                    }
                    if let Err(e) = self.speak_one(&request, guard).await {
                        match e {
                            PipelineError::ChannelClosed => return,
                            other => {
                                // A failed chunk never aborts the turn.
                                tracing::error!(error = %other, msg_id = %request.msg_id, "tts request failed");
                            }
                        }
                    }
                }
            }
        }
    }

    async fn speak_one(
        &self,
        request: &TtsRequest,
        mut guard: CancelGuard,
    ) -> Result<(), PipelineError> {
        use futures::StreamExt;

        let mut stream = self.tts.synthesize(&request.text, &request.voice);
        let mut first = true;

        loop {
            let next = tokio::select! {
                biased;
                _ = guard.cancelled() => {
                    tracing::debug!(msg_id = %request.msg_id, "tts interrupted mid-stream");
                    return Ok(());
                }
                next = tokio::time::timeout(self.chunk_timeout, stream.next()) => next,
            };

            let item = match next {
                Err(_) => {
                    metrics::counter!("voxchat_tts_chunk_timeouts").increment(1);
                    return Err(PipelineError::Timeout(self.chunk_timeout.as_secs()));
                }
                Ok(None) => return Ok(()),
                Ok(Some(Err(e))) => {
                    // Skip the failing chunk, keep the stream going.
                    tracing::error!(error = %e, "tts chunk failed, skipping");
                    continue;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            let mut chunk = self.normalize(item)?;
            let fade_samples = (self.sample_rate_out as u64 * FADE_MS / 1000) as usize;
            if first {
                fade_in(&mut chunk.pcm, fade_samples);
                first = false;
            }

            if guard.is_cancelled() {
                // Taper instead of cutting: emit only a short faded tail.
                chunk.pcm.truncate(fade_samples.max(1));
                let pcm_len = chunk.pcm.len();
                fade_out(&mut chunk.pcm, pcm_len);
                self.egress.write(chunk).await?;
                return Ok(());
            }

            self.egress.write(chunk).await?;
        }
    }

    /// Bring a chunk to the session output rate.
    fn normalize(&self, chunk: AudioChunk) -> Result<AudioChunk, PipelineError> {
        if chunk.sample_rate == self.sample_rate_out {
            return Ok(chunk);
        }
        let input: Vec<f32> = chunk.pcm.iter().map(|s| *s as f32 / 32768.0).collect();
        let output = resample(&input, chunk.sample_rate, self.sample_rate_out)?;
        Ok(AudioChunk::new(pcm_f32_to_i16(&output), self.sample_rate_out))
    }
}

/// Resample mono audio between rates.
pub fn resample(input: &[f32], from: u32, to: u32) -> Result<Vec<f32>, PipelineError> {
    use rubato::{
        Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType,
        WindowFunction,
    };

    if from == to || input.is_empty() {
        return Ok(input.to_vec());
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        to as f64 / from as f64,
        2.0,
        params,
        input.len(),
        1,
    )
    .map_err(|e| PipelineError::Resample(e.to_string()))?;

    let mut output = resampler
        .process(&[input.to_vec()], None)
        .map_err(|e| PipelineError::Resample(e.to_string()))?;
    Ok(output.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voxchat_core::{protocol::Outbound, AudioStream, CancelToken, Language};

    /// Yields `chunks` chunks of 100 ms each, pausing between them.
    struct SlowTts {
        chunks: usize,
        delay: Duration,
        started: Arc<AtomicUsize>,
    }

    impl TextToSpeech for SlowTts {
        fn synthesize(&self, _text: &str, _voice: &str) -> AudioStream {
            self.started.fetch_add(1, Ordering::SeqCst);
            let chunks = self.chunks;
            let delay = self.delay;
            Box::pin(async_stream::stream! {
                for _ in 0..chunks {
                    tokio::time::sleep(delay).await;
                    yield Ok(AudioChunk::new(vec![1000i16; 2400], 24000));
                }
            })
        }

        fn engine_name(&self) -> &str {
            "slow-tts"
        }
    }

    fn request() -> TtsRequest {
        TtsRequest {
            text: "你好。".into(),
            language: Language::Chinese,
            voice: "zh-CN-XiaoxiaoNeural".into(),
            msg_id: "m1".into(),
        }
    }

    async fn drain_audio(rx: &mut mpsc::Receiver<Outbound>) -> usize {
        let mut frames = 0;
        while let Ok(out) = rx.try_recv() {
            if matches!(out, Outbound::Audio(_)) {
                frames += 1;
            }
        }
        frames
    }

    #[tokio::test]
    async fn test_speak_then_flush() {
        let (queue, rx) = PlaybackQueue::new(16);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let egress = AudioEgress::new(out_tx);
        let tts = Arc::new(SlowTts {
            chunks: 2,
            delay: Duration::from_millis(1),
            started: Arc::new(AtomicUsize::new(0)),
        });
        let worker = PlaybackWorker::new(tts, egress, 24000, 15);
        let handle = tokio::spawn(worker.run(rx));

        let token = CancelToken::new();
        queue.speak(request(), token.arm()).await.unwrap();
        let ack = queue.flush().await.unwrap();
        ack.await.unwrap();

        assert_eq!(drain_audio(&mut out_rx).await, 2);
        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_items_are_discarded() {
        let (queue, rx) = PlaybackQueue::new(16);
        let (out_tx, mut out_rx) = mpsc::channel(64);
        let egress = AudioEgress::new(out_tx);
        let started = Arc::new(AtomicUsize::new(0));
        let tts = Arc::new(SlowTts {
            chunks: 2,
            delay: Duration::from_millis(1),
            started: started.clone(),
        });
        let worker = PlaybackWorker::new(tts, egress, 24000, 15);
        let handle = tokio::spawn(worker.run(rx));

        let token = CancelToken::new();
        // Queue three requests, cancel before the worker can start them.
        for _ in 0..3 {
            queue.speak(request(), token.arm()).await.unwrap();
        }
        token.cancel();

        let ack = queue.flush().await.unwrap();
        ack.await.unwrap();

        // Requests may have been dequeued before the cancel landed, but
        // nothing enqueued after it ever starts synthesis fresh.
        let after = started.load(Ordering::SeqCst);
        queue.speak(request(), token.arm()).await.unwrap();
        let ack = queue.flush().await.unwrap();
        ack.await.unwrap();
        assert_eq!(started.load(Ordering::SeqCst), after + 1);

        drain_audio(&mut out_rx).await;
        drop(queue);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_mid_stream_cancel_stops_promptly() {
        let (queue, rx) = PlaybackQueue::new(16);
        let (out_tx, mut out_rx) = mpsc::channel(256);
        let egress = AudioEgress::new(out_tx);
        let tts = Arc::new(SlowTts {
            chunks: 50,
            delay: Duration::from_millis(10),
            started: Arc::new(AtomicUsize::new(0)),
        });
        let worker = PlaybackWorker::new(tts, egress, 24000, 15);
        let handle = tokio::spawn(worker.run(rx));

        let token = CancelToken::new();
        queue.speak(request(), token.arm()).await.unwrap();

        // Let a few chunks through, then interrupt.
        tokio::time::sleep(Duration::from_millis(35)).await;
        token.cancel();
        let ack = queue.flush().await.unwrap();
        tokio::time::timeout(Duration::from_millis(200), ack)
            .await
            .expect("queue must drain promptly after cancel")
            .unwrap();

        let frames = drain_audio(&mut out_rx).await;
        assert!(frames < 50, "cancel must stop the producer loop");

        drop(queue);
        handle.await.unwrap();
    }

    #[test]
    fn test_resample_ratio() {
        let input = vec![0.5f32; 16000];
        let output = resample(&input, 16000, 24000).unwrap();
        let ratio = output.len() as f64 / input.len() as f64;
        assert!((ratio - 1.5).abs() < 0.05, "ratio {ratio}");
    }

    #[test]
    fn test_resample_identity() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample(&input, 24000, 24000).unwrap(), input);
    }
}
