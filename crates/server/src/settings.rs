use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Names the optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "RECEIPTA_CONFIG";

/// Prefix of the environment overrides, e.g. `RECEIPTA_BIND_ADDR`.
pub const ENV_PREFIX: &str = "RECEIPTA";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: '{other}'")),
        }
    }
}

impl TryFrom<String> for LogFormat {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Region of the recognition service; the AWS default chain when unset.
    pub aws_region: Option<String>,
    pub recognition_timeout_secs: u64,
    pub max_body_bytes: usize,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
            aws_region: None,
            recognition_timeout_secs: 30,
            max_body_bytes: 16 * 1024 * 1024,
            log_format: LogFormat::Pretty,
        }
    }
}

impl ServerConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = Config::builder()
            .add_source(File::from_str(toml_content, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// File named by `RECEIPTA_CONFIG` (if any), then `RECEIPTA_*` overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(std::env::vars().collect())
    }

    pub fn load_with(env: HashMap<String, String>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = env.get(CONFIG_PATH_VAR) {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(true));
        }
        let config: ServerConfig = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .ignore_empty(true)
                    .source(Some(env)),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        if self.recognition_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "recognition_timeout_secs",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind_addr.parse().map_err(|_| ConfigError::InvalidValue {
            key: "bind_addr",
            value: self.bind_addr.clone(),
        })
    }

    pub fn recognition_timeout(&self) -> Duration {
        Duration::from_secs(self.recognition_timeout_secs)
    }
}
