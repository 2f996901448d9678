//! Logging capability handed to the service provider.
//!
//! Callers can plug their own sink; the default forwards everything to
//! `tracing` so messages end up wherever the host application's subscriber
//! sends them.

use std::{fmt, sync::Arc};

use tracing::Level;

/// A sink for formatted log messages.
pub trait Logger: Send + Sync {
    /// Emit a formatted message at the given level.
    fn log(&self, level: Level, args: fmt::Arguments<'_>);
}

/// Shared logger handle.
pub type SharedLogger = Arc<dyn Logger>;

/// Forwards messages to the `tracing` macros under the `samlsp` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        // tracing needs the level at compile time
        match level {
            Level::ERROR => tracing::error!(target: "samlsp", "{}", args),
            Level::WARN => tracing::warn!(target: "samlsp", "{}", args),
            Level::INFO => tracing::info!(target: "samlsp", "{}", args),
            Level::DEBUG => tracing::debug!(target: "samlsp", "{}", args),
            _ => tracing::trace!(target: "samlsp", "{}", args),
        }
    }
}

/// Discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// The logger used when none is configured.
pub fn default_logger() -> SharedLogger {
    Arc::new(TracingLogger)
}
