use anyhow::Context;
use serde_json::Value;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Failures while assembling the runtime configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingVar(String),
    #[error("Environment variable {0} has an invalid value: {1}")]
    InvalidValue(String, String),
}

/// Runtime settings, resolved once from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub deepgram_api_key: String,
    pub agent_url: String,
    pub agent_settings_path: PathBuf,
    pub early_media_buffer: usize,
    pub log_level: Level,
}

impl Config {
    /// Reads every setting from the environment, with defaults where one
    /// makes sense.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Tests manage the environment themselves; .env applies to real runs only.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let deepgram_api_key = std::env::var("DEEPGRAM_API_KEY")
            .map_err(|_| ConfigError::MissingVar("DEEPGRAM_API_KEY".to_string()))?;

        let agent_url = std::env::var("AGENT_URL")
            .unwrap_or_else(|_| "wss://agent.deepgram.com/agent".to_string());
        if !agent_url.starts_with("ws://") && !agent_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "AGENT_URL".to_string(),
                format!("'{}' is not a ws:// or wss:// URL", agent_url),
            ));
        }

        let agent_settings_path = std::env::var("AGENT_SETTINGS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./agent_settings.json"));

        let early_media_buffer_str =
            std::env::var("EARLY_MEDIA_BUFFER").unwrap_or_else(|_| "0".to_string());
        let early_media_buffer = early_media_buffer_str.parse::<usize>().map_err(|_| {
            ConfigError::InvalidValue(
                "EARLY_MEDIA_BUFFER".to_string(),
                format!("'{}' is not a frame count", early_media_buffer_str),
            )
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            deepgram_api_key,
            agent_url,
            agent_settings_path,
            early_media_buffer,
            log_level,
        })
    }
}

/// Loads the agent `Settings` payload sent at the start of every call.
/// The gateway never interprets it beyond checking that it is valid JSON,
/// so a malformed file fails startup instead of every call.
pub fn load_agent_settings(path: &Path) -> anyhow::Result<Value> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read agent settings from {}", path.display()))?;
    let settings: Value = serde_json::from_str(&raw)
        .with_context(|| format!("Agent settings at {} are not valid JSON", path.display()))?;
    Ok(settings)
}
