//! Voice-activity segmentation
//!
//! Consumes timestamped audio frames, consults the injected speech detector
//! per frame, and produces complete utterances. Speech onset is reported as
//! its own event on every silence→speech edge, independent of utterance
//! completion: the session uses it to interrupt an in-flight reply without
//! waiting for end-of-utterance.

use std::collections::VecDeque;

use tokio::sync::{broadcast, mpsc};

use voxchat_core::{AudioFrame, SpeechDetector, Utterance};
use voxchat_config::SegmenterConfig;

/// Events produced while segmenting
#[derive(Debug)]
pub enum SegmenterEvent {
    /// The detector saw a silence→speech edge
    SpeechOnset,
    /// A complete utterance closed
    Utterance(Utterance),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Active,
    Hang,
}

/// An utterance being accumulated
struct OpenUtterance {
    samples: Vec<f32>,
    sample_rate: u32,
    t_start: f64,
    t_end: f64,
    pre_roll_ms: u32,
    /// Duration excluding pre-roll, drives the length cap
    content_ms: f64,
}

/// Frame-driven utterance state machine
pub struct Segmenter {
    config: SegmenterConfig,
    detector: Box<dyn SpeechDetector>,
    state: State,
    /// Pre-speech frames kept for onset context
    pre_roll: VecDeque<AudioFrame>,
    pre_roll_ms: f64,
    current: Option<OpenUtterance>,
    silence_ms: f64,
    prev_speech: bool,
}

impl Segmenter {
    pub fn new(config: SegmenterConfig, detector: Box<dyn SpeechDetector>) -> Self {
        Self {
            config,
            detector,
            state: State::Idle,
            pre_roll: VecDeque::new(),
            pre_roll_ms: 0.0,
            current: None,
            silence_ms: 0.0,
            prev_speech: false,
        }
    }

    /// Drive the machine with one frame; returns the events it produced.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Vec<SegmenterEvent> {
        let speech = self.detector.is_speech(frame);
        let mut events = Vec::new();

        if speech && !self.prev_speech {
            events.push(SegmenterEvent::SpeechOnset);
        }
        self.prev_speech = speech;

        match (self.state, speech) {
            (State::Idle, false) => self.buffer_pre_roll(frame),
            (State::Idle, true) => {
                self.open_utterance(frame);
                self.state = State::Active;
            }
            (State::Active, true) => {
                self.append(frame);
                if self.content_ms() >= self.config.max_utterance_ms as f64 {
                    events.extend(self.close());
                    self.state = State::Idle;
                }
            }
            (State::Active, false) => {
                self.append(frame);
                self.silence_ms = frame.duration_ms();
                self.state = State::Hang;
            }
            (State::Hang, true) => {
                self.silence_ms = 0.0;
                self.append(frame);
                self.state = State::Active;
            }
            (State::Hang, false) => {
                self.append(frame);
                self.silence_ms += frame.duration_ms();
                if self.silence_ms >= self.config.min_silence_ms as f64 {
                    events.extend(self.close());
                    self.state = State::Idle;
                }
            }
        }

        events
    }

    fn buffer_pre_roll(&mut self, frame: &AudioFrame) {
        self.pre_roll_ms += frame.duration_ms();
        self.pre_roll.push_back(frame.clone());
        while self.pre_roll_ms > self.config.pre_roll_ms as f64 {
            if let Some(old) = self.pre_roll.pop_front() {
                self.pre_roll_ms -= old.duration_ms();
            } else {
                break;
            }
        }
    }

    fn open_utterance(&mut self, frame: &AudioFrame) {
        let mut samples = Vec::new();
        let mut t_start = frame.t_start;
        let pre_roll_ms = self.pre_roll_ms.round() as u32;

        if let Some(first) = self.pre_roll.front() {
            t_start = first.t_start;
        }
        for buffered in self.pre_roll.drain(..) {
            samples.extend_from_slice(&buffered.samples);
        }
        self.pre_roll_ms = 0.0;

        samples.extend_from_slice(&frame.samples);
        self.current = Some(OpenUtterance {
            samples,
            sample_rate: frame.sample_rate,
            t_start,
            t_end: frame.t_start + frame.duration_ms() / 1000.0,
            pre_roll_ms,
            content_ms: frame.duration_ms(),
        });
        self.silence_ms = 0.0;
    }

    fn append(&mut self, frame: &AudioFrame) {
        if let Some(current) = self.current.as_mut() {
            current.samples.extend_from_slice(&frame.samples);
            current.t_end = frame.t_start + frame.duration_ms() / 1000.0;
            current.content_ms += frame.duration_ms();
        }
    }

    fn content_ms(&self) -> f64 {
        self.current.as_ref().map(|c| c.content_ms).unwrap_or(0.0)
    }

    fn close(&mut self) -> Option<SegmenterEvent> {
        let open = self.current.take()?;
        self.silence_ms = 0.0;

        // Anything without a full frame of actual content is noise.
        if open.samples.is_empty() || open.content_ms <= 0.0 {
            return None;
        }

        Some(SegmenterEvent::Utterance(Utterance {
            samples: open.samples,
            sample_rate: open.sample_rate,
            t_start: open.t_start,
            t_end: open.t_end,
            pre_roll_ms: open.pre_roll_ms,
        }))
    }

    /// Consume frames until the ingest side closes.
    ///
    /// Utterances go to `utterance_tx`; onsets go to `onset_tx` so the
    /// session can interrupt immediately. A lagging queue is reported and
    /// skipped, never an error.
    pub async fn run(
        mut self,
        mut frames: broadcast::Receiver<AudioFrame>,
        utterance_tx: mpsc::Sender<Utterance>,
        onset_tx: mpsc::Sender<()>,
    ) {
        loop {
            match frames.recv().await {
                Ok(frame) => {
                    for event in self.push_frame(&frame) {
                        match event {
                            SegmenterEvent::SpeechOnset => {
                                // Stale onsets are worthless; drop when full.
                                let _ = onset_tx.try_send(());
                            }
                            SegmenterEvent::Utterance(utterance) => {
                                if utterance_tx.send(utterance).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    metrics::counter!("voxchat_ingest_frames_dropped").increment(n);
                    tracing::warn!(dropped = n, "segmenter lagged; oldest audio frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
