//! Runtime settings, loaded from environment variables with an optional
//! `config/default.{yaml,toml,json}` file underneath them (spec.md §6).

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::endpoints;
use crate::ConfigError;

/// One STUN/TURN server entry, converted by the orchestrator into
/// `voice_agent_transport::IceServer` at peer-creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub credential: Option<String>,
}

fn default_ice_servers() -> Vec<IceServerConfig> {
    let urls = std::env::var("VOICE_AGENT_ICE_SERVERS")
        .map(|s| s.split(',').map(|u| u.trim().to_string()).collect())
        .unwrap_or_else(|_| vec!["stun:stun.l.google.com:19302".to_string()]);

    vec![IceServerConfig {
        urls,
        username: None,
        credential: None,
    }]
}

fn default_bind_addr() -> String {
    std::env::var("VOICE_AGENT_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

fn default_max_sessions() -> usize {
    std::env::var("VOICE_AGENT_MAX_SESSIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(100)
}

fn default_log_level() -> String {
    std::env::var("VOICE_AGENT_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string())
}

/// Exact-match transcripts the segmenter (C6) treats as non-speech
/// (spec.md §4.6, §9 Open Question: ASR-specific, configurable list). Empty
/// string is handled separately by `is_trivial`; the rest mirror the
/// original's literal set.
fn default_trivial_rejections() -> Vec<String> {
    vec![
        ".".to_string(),
        "Thank you.".to_string(),
        ".  .  .  .".to_string(),
    ]
}

fn default_elevenlabs_api_key() -> String {
    std::env::var("ELEVENLABS_API_KEY").unwrap_or_default()
}

/// Deployment-wide interruption policy (spec.md §3 `Session.allows_interruptions`).
/// `POST /invite-agent` has no per-request field for this (spec.md §6), so it
/// is a server-level default instead.
fn default_allows_interruptions() -> bool {
    std::env::var("VOICE_AGENT_ALLOWS_INTERRUPTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(true)
}

/// Upstream service endpoints (spec.md §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(default = "endpoints::signaling_default")]
    pub signaling_url: String,

    #[serde(default = "endpoints::token_stream_default")]
    pub token_stream_url: String,

    #[serde(default = "endpoints::transcription_default")]
    pub transcription_url: String,

    #[serde(default = "default_elevenlabs_api_key")]
    pub elevenlabs_api_key: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            signaling_url: endpoints::signaling_default(),
            token_stream_url: endpoints::token_stream_default(),
            transcription_url: endpoints::transcription_default(),
            elevenlabs_api_key: default_elevenlabs_api_key(),
        }
    }
}

/// Admission HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_sessions: default_max_sessions(),
        }
    }
}

/// Top-level settings for the orchestrator (spec.md §6, §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub endpoints: Endpoints,

    #[serde(default = "default_ice_servers")]
    pub ice_servers: Vec<IceServerConfig>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Exact-match transcripts treated as non-speech (spec.md §9 Open Question).
    #[serde(default = "default_trivial_rejections")]
    pub trivial_rejections: Vec<String>,

    /// Default `Session.allows_interruptions` policy for newly admitted
    /// conversations (spec.md §3, §9 Open Question).
    #[serde(default = "default_allows_interruptions")]
    pub allows_interruptions: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            endpoints: Endpoints::default(),
            ice_servers: default_ice_servers(),
            log_level: default_log_level(),
            trivial_rejections: default_trivial_rejections(),
            allows_interruptions: default_allows_interruptions(),
        }
    }
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.max_sessions".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.ice_servers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ice_servers".to_string(),
                message: "at least one STUN/TURN server is required".to_string(),
            });
        }

        for (i, server) in self.ice_servers.iter().enumerate() {
            if server.urls.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("ice_servers[{i}].urls"),
                    message: "must not be empty".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Loads settings from `config/default.{yaml,toml,json}` (if present),
/// overridden by `VOICE_AGENT__`-prefixed environment variables.
pub fn load_settings() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("VOICE_AGENT")
                .separator("__")
                .try_parsing(true),
        );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.server.max_sessions, 100);
    }

    #[test]
    fn zero_max_sessions_rejected() {
        let mut settings = Settings::default();
        settings.server.max_sessions = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn empty_ice_servers_rejected() {
        let mut settings = Settings::default();
        settings.ice_servers.clear();
        assert!(settings.validate().is_err());
    }
}
