//! Shared application state
//!
//! Process-wide singletons injected into every session: the ASR engine, the
//! TTS engine, the LLM client, and settings. The VAD is the exception — each
//! session owns a mutable detector, so the state carries a factory.

use std::sync::Arc;

use voxchat_config::Settings;
use voxchat_core::{LanguageModel, SpeechDetector, SpeechToText, TextToSpeech};
use voxchat_pipeline::EnergyVad;

use crate::session::SessionManager;

/// Factory producing one detector per session
pub type VadFactory = Arc<dyn Fn() -> Box<dyn SpeechDetector> + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub asr: Arc<dyn SpeechToText>,
    pub tts: Arc<dyn TextToSpeech>,
    pub llm: Arc<dyn LanguageModel>,
    pub sessions: Arc<SessionManager>,
    pub vad_factory: VadFactory,
}

impl AppState {
    pub fn new(
        settings: Settings,
        asr: Arc<dyn SpeechToText>,
        tts: Arc<dyn TextToSpeech>,
        llm: Arc<dyn LanguageModel>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            asr,
            tts,
            llm,
            sessions: Arc::new(SessionManager::new()),
            vad_factory: Arc::new(|| Box::new(EnergyVad::default_config())),
        }
    }

    /// Replace the default energy VAD with another detector.
    pub fn with_vad_factory(mut self, factory: VadFactory) -> Self {
        self.vad_factory = factory;
        self
    }
}
