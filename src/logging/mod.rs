//! Logging and output control
//!
//! This module provides the [`Logger`] handle carried by the registry client.
//! It emits `tracing` events, so the installed subscriber decides which levels
//! are shown; the only switch kept on the handle is `quiet`.

use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Logger responsible for all diagnostic output of the client
#[derive(Debug, Clone, Default)]
pub struct Logger {
    /// Suppresses everything below error level
    pub quiet: bool,
}

impl Logger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_quiet() -> Self {
        Self { quiet: true }
    }

    pub fn trace(&self, message: &str) {
        if !self.quiet {
            tracing::trace!("{}", message);
        }
    }

    pub fn verbose(&self, message: &str) {
        if !self.quiet {
            tracing::debug!("{}", message);
        }
    }

    /// Detailed information, at debug level
    pub fn detail(&self, message: &str) {
        if !self.quiet {
            tracing::debug!(detail = true, "{}", message);
        }
    }

    pub fn info(&self, message: &str) {
        if !self.quiet {
            tracing::info!("{}", message);
        }
    }

    pub fn success(&self, message: &str) {
        if !self.quiet {
            tracing::info!(success = true, "{}", message);
        }
    }

    pub fn warning(&self, message: &str) {
        if !self.quiet {
            tracing::warn!("{}", message);
        }
    }

    /// Errors are emitted even in quiet mode
    pub fn error(&self, message: &str) {
        tracing::error!("{}", message);
    }

    /// Format a byte count in human-readable units
    pub fn format_size(&self, bytes: u64) -> String {
        if bytes < 1024 {
            format!("{} B", bytes)
        } else if bytes < 1024 * 1024 {
            format!("{:.1} KB", bytes as f64 / 1024.0)
        } else if bytes < 1024 * 1024 * 1024 {
            format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
        } else {
            format!("{:.1} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
        }
    }

    pub fn format_duration(&self, duration: Duration) -> String {
        let secs = duration.as_secs();
        if secs < 60 {
            format!("{}.{:03}s", secs, duration.subsec_millis())
        } else if secs < 3600 {
            format!("{}m{}s", secs / 60, secs % 60)
        } else {
            format!("{}h{}m{}s", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
    }
}

/// Shortens a digest for log lines
pub fn short_digest(digest: &str) -> &str {
    match digest.char_indices().nth(19) {
        Some((idx, _)) => &digest[..idx],
        None => digest,
    }
}

/// Installs a fmt subscriber; `RUST_LOG` overrides the level chosen by `verbose`
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "registry_client=debug,info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // A second initialization (e.g. in tests) is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
