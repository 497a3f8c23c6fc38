//! Default voice-activity detector
//!
//! Adaptive energy detector: a frame is speech when its RMS exceeds the
//! tracked noise floor by a fixed ratio. The floor adapts slowly during
//! silence so the detector survives changing room tone. Model-based
//! detectors plug in through the same `SpeechDetector` trait.

use serde::{Deserialize, Serialize};

use voxchat_core::{AudioFrame, SpeechDetector};

/// Energy VAD tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyVadConfig {
    /// Initial noise floor (RMS)
    pub initial_floor: f32,
    /// Floor never adapts below this
    pub min_floor: f32,
    /// Speech when rms > floor * ratio
    pub speech_ratio: f32,
    /// Exponential floor adaptation rate during silence
    pub adapt_rate: f32,
    /// Consecutive speech frames required before reporting speech
    pub onset_frames: u32,
}

impl Default for EnergyVadConfig {
    fn default() -> Self {
        Self {
            initial_floor: 0.01,
            min_floor: 0.002,
            speech_ratio: 3.0,
            adapt_rate: 0.05,
            onset_frames: 2,
        }
    }
}

/// Adaptive energy detector
pub struct EnergyVad {
    config: EnergyVadConfig,
    floor: f32,
    run: u32,
}

impl EnergyVad {
    pub fn new(config: EnergyVadConfig) -> Self {
        let floor = config.initial_floor.max(config.min_floor);
        Self {
            config,
            floor,
            run: 0,
        }
    }

    pub fn default_config() -> Self {
        Self::new(EnergyVadConfig::default())
    }
}

impl SpeechDetector for EnergyVad {
    fn is_speech(&mut self, frame: &AudioFrame) -> bool {
        let rms = frame.rms();
        let loud = rms > self.floor * self.config.speech_ratio;

        if loud {
            self.run += 1;
        } else {
            self.run = 0;
            // Track room tone only while quiet.
            self.floor = (self.floor * (1.0 - self.config.adapt_rate)
                + rms * self.config.adapt_rate)
                .max(self.config.min_floor);
        }

        self.run >= self.config.onset_frames
    }

    fn reset(&mut self) {
        self.floor = self.config.initial_floor.max(self.config.min_floor);
        self.run = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(amplitude: f32) -> AudioFrame {
        AudioFrame::new(vec![amplitude; 320], 16000, 0.0)
    }

    #[test]
    fn test_silence_is_not_speech() {
        let mut vad = EnergyVad::default_config();
        for _ in 0..10 {
            assert!(!vad.is_speech(&frame(0.001)));
        }
    }

    #[test]
    fn test_loud_frames_trigger_after_onset_run() {
        let mut vad = EnergyVad::default_config();
        // First loud frame is below the onset run length.
        assert!(!vad.is_speech(&frame(0.5)));
        assert!(vad.is_speech(&frame(0.5)));
    }

    #[test]
    fn test_floor_adapts_to_room_tone() {
        let mut vad = EnergyVad::default_config();
        // Hold moderately noisy "silence" long enough for the floor to rise.
        for _ in 0..200 {
            vad.is_speech(&frame(0.02));
        }
        // What was loud relative to the initial floor is now background.
        assert!(!vad.is_speech(&frame(0.03)));
    }

    #[test]
    fn test_reset_restores_initial_state() {
        let mut vad = EnergyVad::default_config();
        for _ in 0..200 {
            vad.is_speech(&frame(0.02));
        }
        vad.reset();
        assert!(!vad.is_speech(&frame(0.5)));
        assert!(vad.is_speech(&frame(0.5)));
    }
}
