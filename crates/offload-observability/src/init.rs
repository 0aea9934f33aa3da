// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Unified logging initialization for the offload runtime
//!
//! Console output is always installed. With the `file-logging` feature a
//! timestamped run folder receives a combined JSON log as well.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

#[cfg(feature = "file-logging")]
use std::path::{Path, PathBuf};

use crate::cli::CrateDebugFlags;

/// Logging initialization result
///
/// Keep it alive for the lifetime of the process; dropping it flushes file output.
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    #[cfg(feature = "file-logging")]
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Get the run folder receiving file logs, if any
    #[cfg(feature = "file-logging")]
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Build the filter used by every layer
///
/// `RUST_LOG`, when set, wins over the debug flags.
pub fn build_filter(debug_flags: &CrateDebugFlags, default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(debug_flags.to_filter_string(default_level)))
}

/// Initialize console logging
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_logging(debug_flags: &CrateDebugFlags, default_level: &str) -> Result<LoggingGuard> {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(build_filter(debug_flags, default_level));

    Registry::default()
        .with(console_layer)
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        #[cfg(feature = "file-logging")]
        log_dir: None,
    })
}

/// Initialize console logging plus a combined JSON log file
///
/// Creates `<log_dir>/run_<YYYYmmdd_HHMMSS>/offload.log`.
#[cfg(feature = "file-logging")]
pub fn init_logging_to_dir(
    debug_flags: &CrateDebugFlags,
    default_level: &str,
    log_dir: &Path,
) -> Result<LoggingGuard> {
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(build_filter(debug_flags, default_level))
        .boxed();

    let appender = tracing_appender::rolling::never(&run_folder, "offload.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .json()
        .with_filter(build_filter(debug_flags, default_level))
        .boxed();

    Registry::default()
        .with(vec![console_layer, file_layer])
        .try_init()
        .context("Failed to install global tracing subscriber")?;

    Ok(LoggingGuard {
        _file_guards: vec![guard],
        log_dir: Some(run_folder),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        let flags = CrateDebugFlags::default();
        // The first call may race with other test binaries' subscribers; only the
        // second call is guaranteed to see an installed subscriber.
        let _first = init_logging(&flags, "info");
        assert!(init_logging(&flags, "info").is_err());
    }

    #[test]
    fn test_debug_flag_enables_crate_target() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-offload-device".to_string()]);
        let subscriber =
            Registry::default().with(EnvFilter::new(flags.to_filter_string("info")));

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "offload-device", tracing::Level::DEBUG));
            assert!(!tracing::enabled!(target: "offload-memkind", tracing::Level::DEBUG));
            assert!(tracing::enabled!(target: "offload-memkind", tracing::Level::INFO));
        });
    }

    #[test]
    fn test_debug_all_reaches_config_target() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        let subscriber = Registry::default().with(EnvFilter::new(flags.to_filter_string("warn")));

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "offload-config", tracing::Level::DEBUG));
            assert!(tracing::enabled!(target: "offload-memkind", tracing::Level::DEBUG));
            assert!(!tracing::enabled!(target: "other-crate", tracing::Level::INFO));
        });
    }
}
