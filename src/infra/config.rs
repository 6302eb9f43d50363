use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::infra::runtime::session::SessionPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub session_policy: SessionPolicy,
    pub keep_alive_secs: u64,
    /// Frames buffered per session before `send` waits on the client.
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3002,
            session_policy: SessionPolicy::SingleActive,
            keep_alive_secs: 15,
            outbound_buffer: 64,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0}")]
    Invalid(String),
}

impl Config {
    /// Defaults, then the TOML file named by `GATEWAY_CONFIG` (if any), then env.
    pub fn from_env_and_toml() -> Result<Self, ConfigError> {
        let mut cfg = match std::env::var("GATEWAY_CONFIG") {
            Ok(path) if !path.trim().is_empty() => Self::from_toml_file(Path::new(path.trim()))?,
            _ => Self::default(),
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(port) = env_parse::<u16>("PORT")? {
            self.port = port;
        }
        if let Ok(policy) = std::env::var("SESSION_POLICY") {
            self.session_policy = policy.parse().map_err(ConfigError::Invalid)?;
        }
        if let Some(secs) = env_parse::<u64>("SSE_KEEP_ALIVE_SECS")? {
            self.keep_alive_secs = secs;
        }
        if let Some(n) = env_parse::<usize>("OUTBOUND_BUFFER")? {
            self.outbound_buffer = n;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("PORT cannot be 0".into()));
        }
        if self.outbound_buffer == 0 {
            return Err(ConfigError::Invalid("OUTBOUND_BUFFER must be at least 1".into()));
        }
        if self.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid("SSE_KEEP_ALIVE_SECS must be at least 1".into()));
        }
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{key} is not valid: {v}"))),
        _ => Ok(None),
    }
}
