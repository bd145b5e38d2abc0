//! Configuration sections and their compiled defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Executor process settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Executor binary. Bare names are looked up next to the current
    /// executable first, then on PATH.
    /// Default: agentwatch-executor
    #[serde(default = "ExecutorConfig::default_program")]
    pub program: String,

    /// Number of command workers. Commands are processed in receipt order
    /// only with a single worker.
    /// Default: 1
    #[serde(default = "ExecutorConfig::default_workers")]
    pub workers: usize,

    /// Directory for the host/executor Unix socket.
    /// Default: /tmp
    #[serde(default = "ExecutorConfig::default_socket_dir")]
    pub socket_dir: PathBuf,
}

impl ExecutorConfig {
    fn default_program() -> String {
        "agentwatch-executor".to_string()
    }

    fn default_workers() -> usize {
        1
    }

    fn default_socket_dir() -> PathBuf {
        PathBuf::from("/tmp")
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            program: Self::default_program(),
            workers: Self::default_workers(),
            socket_dir: Self::default_socket_dir(),
        }
    }
}

/// Host-side timeouts for the executor lifecycle and correlated waits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    /// How long to wait for the spawned executor to connect.
    #[serde(default = "HostConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bounded wait for the "initialized" push. Late init is not fatal.
    #[serde(default = "HostConfig::default_init_timeout_ms")]
    pub init_timeout_ms: u64,

    /// Default timeout for correlated sends.
    #[serde(default = "HostConfig::default_command_timeout_ms")]
    pub command_timeout_ms: u64,

    /// Interval at which correlated sends poll the return queue.
    #[serde(default = "HostConfig::default_response_poll_ms")]
    pub response_poll_ms: u64,

    /// Wait for "exit ready" after SHUTDOWN.
    #[serde(default = "HostConfig::default_exit_timeout_ms")]
    pub exit_timeout_ms: u64,

    /// Liveness polling window before sending SIGTERM.
    #[serde(default = "HostConfig::default_exit_grace_ms")]
    pub exit_grace_ms: u64,

    /// Wait after SIGTERM before SIGKILL.
    #[serde(default = "HostConfig::default_terminate_wait_ms")]
    pub terminate_wait_ms: u64,
}

impl HostConfig {
    fn default_connect_timeout_ms() -> u64 {
        5_000
    }

    fn default_init_timeout_ms() -> u64 {
        1_000
    }

    fn default_command_timeout_ms() -> u64 {
        5_000
    }

    fn default_response_poll_ms() -> u64 {
        10
    }

    fn default_exit_timeout_ms() -> u64 {
        5_000
    }

    fn default_exit_grace_ms() -> u64 {
        1_000
    }

    fn default_terminate_wait_ms() -> u64 {
        500
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            init_timeout_ms: Self::default_init_timeout_ms(),
            command_timeout_ms: Self::default_command_timeout_ms(),
            response_poll_ms: Self::default_response_poll_ms(),
            exit_timeout_ms: Self::default_exit_timeout_ms(),
            exit_grace_ms: Self::default_exit_grace_ms(),
            terminate_wait_ms: Self::default_terminate_wait_ms(),
        }
    }
}

/// Which outbound hosts are captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptConfig {
    #[serde(default = "InterceptConfig::default_hosts")]
    pub hosts: Vec<String>,
}

impl InterceptConfig {
    fn default_hosts() -> Vec<String> {
        [
            "api.openai.com",
            "api.anthropic.com",
            "api.cohere.ai",
            "api.mistral.ai",
            "api.groq.com",
            "api.together.xyz",
            "localhost",
            "127.0.0.1",
        ]
        .iter()
        .map(|h| h.to_string())
        .collect()
    }
}

impl Default for InterceptConfig {
    fn default() -> Self {
        Self {
            hosts: Self::default_hosts(),
        }
    }
}

/// Webhook delivery and the built-in visualization subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhooksConfig {
    /// Per-delivery HTTP timeout.
    #[serde(default = "WebhooksConfig::default_timeout_ms")]
    pub timeout_ms: u64,

    /// Register the visualization backend as a subscriber at startup.
    #[serde(default = "WebhooksConfig::default_visualization")]
    pub visualization: bool,

    /// Local port of the visualization backend.
    #[serde(default = "WebhooksConfig::default_visualization_port")]
    pub visualization_port: u16,

    #[serde(default = "WebhooksConfig::default_visualization_path")]
    pub visualization_path: String,
}

impl WebhooksConfig {
    fn default_timeout_ms() -> u64 {
        5_000
    }

    fn default_visualization() -> bool {
        true
    }

    fn default_visualization_port() -> u16 {
        9002
    }

    fn default_visualization_path() -> String {
        "/api/events".to_string()
    }

    /// URL of the visualization backend's event endpoint.
    pub fn visualization_url(&self) -> String {
        format!(
            "http://localhost:{}{}",
            self.visualization_port, self.visualization_path
        )
    }
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            timeout_ms: Self::default_timeout_ms(),
            visualization: Self::default_visualization(),
            visualization_port: Self::default_visualization_port(),
            visualization_path: Self::default_visualization_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive).
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}
