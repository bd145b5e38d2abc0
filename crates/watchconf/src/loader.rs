//! Config file discovery, loading, and environment variable overlay.

use crate::{AgentwatchConfig, ConfigError};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided and exists, it replaces the local override.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/agentwatch/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("agentwatch/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("agentwatch.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read one config file as a raw TOML table.
pub fn read_table(path: &Path) -> Result<toml::Table, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_table(&contents, path)
}

fn parse_table(contents: &str, path: &Path) -> Result<toml::Table, ConfigError> {
    contents
        .parse()
        .map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Merge `overlay` into `base` key by key. Nested tables merge recursively;
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Deserialize a merged table, filling absent keys with compiled defaults.
pub fn from_table(table: toml::Table, origin: &Path) -> Result<AgentwatchConfig, ConfigError> {
    let mut config: AgentwatchConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
    let socket_dir = config.executor.socket_dir.to_string_lossy().into_owned();
    config.executor.socket_dir = expand_path(&socket_dir);
    Ok(config)
}

/// Load config from a single TOML file.
pub fn load_from_file(path: &Path) -> Result<AgentwatchConfig, ConfigError> {
    from_table(read_table(path)?, path)
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(config: &mut AgentwatchConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("AGENTWATCH_EXECUTOR") {
        config.executor.program = v;
        sources.env_overrides.push("AGENTWATCH_EXECUTOR".to_string());
    }
    if let Ok(v) = env::var("AGENTWATCH_WORKERS") {
        if let Ok(workers) = v.parse() {
            config.executor.workers = workers;
            sources.env_overrides.push("AGENTWATCH_WORKERS".to_string());
        }
    }
    if let Ok(v) = env::var("AGENTWATCH_SOCKET_DIR") {
        config.executor.socket_dir = expand_path(&v);
        sources.env_overrides.push("AGENTWATCH_SOCKET_DIR".to_string());
    }

    if let Ok(v) = env::var("AGENTWATCH_VISUALIZATION_PORT") {
        if let Ok(port) = v.parse() {
            config.webhooks.visualization_port = port;
            sources.env_overrides.push("AGENTWATCH_VISUALIZATION_PORT".to_string());
        }
    }
    if let Ok(v) = env::var("AGENTWATCH_VISUALIZATION") {
        if let Some(enabled) = parse_bool(&v) {
            config.webhooks.visualization = enabled;
            sources.env_overrides.push("AGENTWATCH_VISUALIZATION".to_string());
        }
    }

    if let Ok(v) = env::var("AGENTWATCH_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("AGENTWATCH_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Ok(v) = env::var("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        match directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            Some(home) => home.join(stripped),
            None => PathBuf::from(path),
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some(slash_pos) = stripped.find('/') {
            let var_name = &stripped[..slash_pos];
            match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(&stripped[slash_pos + 1..]),
                Err(_) => PathBuf::from(path),
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}
