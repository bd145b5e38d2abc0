//! Host-side errors.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use watchproto::{ChannelError, CommandAction};

/// Failure of a host operation.
///
/// None of these are fatal to the instrumented application; at worst the
/// call graph stops updating.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("executor is not running")]
    NotRunning,

    /// A correlated wait ran past its deadline.
    #[error("no response to {action} ({callback_id}) within {waited:?}")]
    Timeout {
        action: CommandAction,
        callback_id: String,
        waited: Duration,
    },

    #[error("channel transport failed: {0}")]
    Transport(#[from] ChannelError),

    #[error("failed to spawn executor {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("executor did not connect within {0:?}")]
    ConnectTimeout(Duration),

    #[error("failed to set up executor socket {path}: {source}")]
    Socket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to hand config to executor: {0}")]
    Config(#[from] watchconf::ConfigError),

    #[error("invalid command params: {0}")]
    Params(#[source] serde_json::Error),
}

impl HostError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HostError::Timeout { .. })
    }
}
