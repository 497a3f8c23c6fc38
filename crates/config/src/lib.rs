//! Configuration management for the voxchat server
//!
//! Supports loading configuration from:
//! - TOML/YAML files
//! - Environment variables (VOXCHAT_ prefix, `__` section separator)

pub mod settings;

pub use settings::{
    load_settings, AsrConfig, AudioConfig, BrainConfig, LlmConfig, SegmenterConfig, ServerConfig,
    Settings, ToolsConfig, TtsConfig,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
