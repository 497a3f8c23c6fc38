//! Settings tree
//!
//! Every tunable of the conversation core lives here with its default.
//! Values come from an optional file (TOML or YAML) overlaid with
//! `VOXCHAT_`-prefixed environment variables, e.g.
//! `VOXCHAT_LLM__API_KEY=sk-...` or `VOXCHAT_SERVER__PORT=9000`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use voxchat_core::Language;

use crate::ConfigError;

/// Root settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub asr: AsrConfig,
    pub tts: TtsConfig,
    pub audio: AudioConfig,
    pub segmenter: SegmenterConfig,
    pub brain: BrainConfig,
    pub tools: ToolsConfig,
}

/// HTTP/WebSocket bind options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// LLM backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Credential for the backend; required at startup
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Abort a stream that produces no event for this long
    pub inactivity_timeout_s: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "anthropic/claude-3-5-nano".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            inactivity_timeout_s: 60,
        }
    }
}

/// ASR backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AsrConfig {
    pub engine: String,
    pub whisper_model_size: String,
    /// Inference endpoint for the HTTP whisper adapter
    pub endpoint: String,
}

impl Default for AsrConfig {
    fn default() -> Self {
        Self {
            engine: "whisper".to_string(),
            whisper_model_size: "base".to_string(),
            endpoint: "http://127.0.0.1:8178/inference".to_string(),
        }
    }
}

/// TTS voices and pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub voice_en: String,
    pub voice_zh: String,
    /// Synthesis endpoint for the HTTP speech adapter
    pub endpoint: String,
    /// Give up on a chunk that takes longer than this to produce
    pub chunk_timeout_s: u64,
    /// Soft minimum characters per speakable chunk
    pub min_chunk_chars: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice_en: "en-US-JennyNeural".to_string(),
            voice_zh: "zh-CN-XiaoxiaoNeural".to_string(),
            endpoint: "http://127.0.0.1:8179/v1/audio/speech".to_string(),
            chunk_timeout_s: 15,
            min_chunk_chars: 40,
        }
    }
}

/// PCM rates and framing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate_in: u32,
    pub sample_rate_out: u32,
    pub frame_ms: u32,
    /// Frames a lagging consumer may fall behind before oldest are dropped
    pub max_frames_queue: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_in: 16000,
            sample_rate_out: 24000,
            frame_ms: 20,
            max_frames_queue: 256,
        }
    }
}

/// Utterance segmentation thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub pre_roll_ms: u32,
    pub min_silence_ms: u32,
    pub max_utterance_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            pre_roll_ms: 300,
            min_silence_ms: 600,
            max_utterance_ms: 15000,
        }
    }
}

/// Reasoning loop limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    pub default_language: Language,
    pub max_conversation_history: usize,
    pub max_tool_iterations: u32,
    pub tool_timeout_s: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            default_language: Language::Chinese,
            max_conversation_history: 20,
            max_tool_iterations: 5,
            tool_timeout_s: 30,
        }
    }
}

/// Tool credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Enables the web-search tool when present
    pub serper_api_key: Option<String>,
}

impl Settings {
    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("llm.api_key".to_string()));
        }
        if self.audio.frame_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.frame_ms".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.audio.sample_rate_in == 0 || self.audio.sample_rate_out == 0 {
            return Err(ConfigError::InvalidValue {
                field: "audio.sample_rate".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.segmenter.max_utterance_ms < self.audio.frame_ms {
            return Err(ConfigError::InvalidValue {
                field: "segmenter.max_utterance_ms".to_string(),
                message: "shorter than one frame".to_string(),
            });
        }
        if self.brain.max_conversation_history == 0 {
            return Err(ConfigError::InvalidValue {
                field: "brain.max_conversation_history".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Voice for a reply language, falling back to the configured default.
    pub fn voice_for(&self, language: Language) -> &str {
        let effective = match language {
            Language::Unknown => self.brain.default_language,
            other => other,
        };
        match effective {
            Language::English => &self.tts.voice_en,
            _ => &self.tts.voice_zh,
        }
    }
}

/// Load settings from an optional file plus environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        builder = builder.add_source(config::File::from(path));
        tracing::info!(path = %path.display(), "loading configuration file");
    }

    builder = builder.add_source(
        config::Environment::with_prefix("VOXCHAT")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    Ok(settings)
}
