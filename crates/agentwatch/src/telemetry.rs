//! Logging setup.
//!
//! Logs go to stderr so stdout stays with the instrumented application. The
//! filter sits behind a reload layer, which lets `VERBOSE` raise the level of
//! every logger at runtime.

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

/// Something whose logging verbosity can be raised at runtime. It is never
/// lowered again.
pub trait VerbosityControl: Send + Sync {
    fn raise_verbosity(&self);
}

/// Handle to the installed log filter.
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogControl {
    /// Replace the active filter with a new directive.
    pub fn set_filter(&self, directive: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter '{}'", directive))?;
        self.handle
            .reload(filter)
            .context("failed to reload log filter")?;
        Ok(())
    }
}

impl VerbosityControl for LogControl {
    fn raise_verbosity(&self) {
        match self.set_filter("debug") {
            Ok(()) => info!("log verbosity raised to debug"),
            Err(e) => warn!("failed to raise log verbosity: {:#}", e),
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. Fails if a global subscriber is
/// already installed.
pub fn init(level: &str) -> Result<LogControl> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(LogControl { handle })
}
