//! Voice-activity detection seam

use crate::audio::AudioFrame;

/// Per-frame speech/silence verdict
///
/// The segmenter consults the detector once per frame and acts only on the
/// boolean. Thresholding, smoothing, and hangover are properties of the
/// detector, not re-applied downstream. Each session owns its detector
/// exclusively, so implementations may keep mutable state.
pub trait SpeechDetector: Send + 'static {
    /// Classify one frame.
    fn is_speech(&mut self, frame: &AudioFrame) -> bool;

    /// Clear adaptive state between sessions or after a reset.
    fn reset(&mut self);
}
