//! Configuration loading for agentwatch.
//!
//! Both the host library and the executor binary import this crate, so it
//! keeps its dependencies minimal.
//!
//! # Usage
//!
//! ```rust,no_run
//! use watchconf::AgentwatchConfig;
//!
//! let config = AgentwatchConfig::load().expect("Failed to load config");
//! println!("executor: {}", config.executor.program);
//! println!("visualization: {}", config.webhooks.visualization_url());
//! ```
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/agentwatch/config.toml` (system)
//! 2. `~/.config/agentwatch/config.toml` (user)
//! 3. `./agentwatch.toml` (local override, replaced by an explicit path)
//! 4. Environment variables (`AGENTWATCH_*`, `RUST_LOG`)
//!
//! # Example Config
//!
//! ```toml
//! [executor]
//! program = "/usr/local/bin/agentwatch-executor"
//! workers = 1
//! socket_dir = "$XDG_RUNTIME_DIR/agentwatch"
//!
//! [host]
//! command_timeout_ms = 5000
//!
//! [intercept]
//! hosts = ["api.openai.com", "api.anthropic.com", "localhost"]
//!
//! [webhooks]
//! visualization = true
//! visualization_port = 9002
//!
//! [telemetry]
//! log_level = "info"
//! ```

pub mod loader;
pub mod sections;

pub use loader::{discover_config_files_with_override, expand_path, ConfigSources};
pub use sections::{ExecutorConfig, HostConfig, InterceptConfig, TelemetryConfig, WebhooksConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Failed to write config file {path}: {message}")]
    Write { path: PathBuf, message: String },
}

/// Complete agentwatch configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentwatchConfig {
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default)]
    pub intercept: InterceptConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AgentwatchConfig {
    /// Load configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load configuration with an explicit file replacing `./agentwatch.toml`.
    /// System and user configs still load first.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and return information about sources.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let mut merged = toml::Table::new();
        let mut origin = PathBuf::from("<defaults>");

        for path in loader::discover_config_files_with_override(config_path) {
            let table = loader::read_table(&path)?;
            loader::merge_tables(&mut merged, table);
            origin = path.clone();
            sources.files.push(path);
        }

        let mut config = loader::from_table(merged, &origin)?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Write the whole config to `path` so another process can load it.
    pub fn write_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |message: String| ConfigError::Write {
            path: path.to_path_buf(),
            message,
        };
        let text = self.to_toml().map_err(|e| write_err(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| write_err(e.to_string()))
    }
}

impl HostConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn init_timeout(&self) -> Duration {
        Duration::from_millis(self.init_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn response_poll(&self) -> Duration {
        Duration::from_millis(self.response_poll_ms.max(1))
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_millis(self.exit_timeout_ms)
    }

    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    pub fn terminate_wait(&self) -> Duration {
        Duration::from_millis(self.terminate_wait_ms)
    }
}

impl WebhooksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AgentwatchConfig::default();
        assert_eq!(config.executor.workers, 1);
        assert_eq!(config.host.response_poll(), Duration::from_millis(10));
        assert_eq!(config.webhooks.visualization_url(), "http://localhost:9002/api/events");
        assert!(config.intercept.hosts.iter().any(|h| h == "api.anthropic.com"));
        assert_eq!(config.telemetry.log_level, "info");
    }

    #[test]
    fn test_to_toml_reparses() {
        let config = AgentwatchConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: AgentwatchConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_empty_document_is_default() {
        let parsed: AgentwatchConfig = toml::from_str("").unwrap();
        assert_eq!(parsed, AgentwatchConfig::default());
    }
}
