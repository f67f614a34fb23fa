//! Runtime configuration for the voice agent orchestrator.
//!
//! Settings load from environment variables (optionally layered over a
//! `config/default.{yaml,toml,json}` file) -- see [`settings::load_settings`].

pub mod constants;
pub mod settings;

pub use settings::{Endpoints, IceServerConfig, ServerConfig, Settings, load_settings};

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

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for voice_agent_core::OrchestratorError {
    fn from(err: ConfigError) -> Self {
        voice_agent_core::OrchestratorError::Programmer(err.to_string())
    }
}
