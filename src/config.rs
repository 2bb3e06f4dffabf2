//! Configuration loader and validator for the studio admin console.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub database: Database,
    #[serde(default)]
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Initial state of the admin-mode switch.
    #[serde(default)]
    pub admin_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Database {
    pub url: String,
}

/// Pre-flight connectivity probe. No `probe_url` means always online.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connectivity {
    #[serde(default)]
    pub probe_url: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for Connectivity {
    fn default() -> Self {
        Self {
            probe_url: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    3000
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// `DATABASE_URL` overrides the configured URL.
    pub fn database_url(&self) -> String {
        std::env::var("DATABASE_URL").unwrap_or_else(|_| self.database.url.clone())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.connectivity.timeout_ms)
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.database.url.trim().is_empty() {
        return Err(ConfigError::Invalid("database.url must be non-empty"));
    }
    if cfg.connectivity.timeout_ms == 0 {
        return Err(ConfigError::Invalid("connectivity.timeout_ms must be > 0"));
    }
    if let Some(url) = &cfg.connectivity.probe_url {
        if reqwest::Url::parse(url).is_err() {
            return Err(ConfigError::Invalid("connectivity.probe_url must be a valid URL"));
        }
    }
    Ok(())
}

pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  admin_mode: false

database:
  url: "sqlite://./data/studio.db"

connectivity:
  probe_url: "https://www.gstatic.com/generate_204"
  timeout_ms: 3000
"#
}
