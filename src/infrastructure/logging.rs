//! Logging system configuration and initialization
//!
//! This module provides the logging setup with:
//! - Console output and optional file output (non-blocking writer)
//! - Configuration based log level control with `RUST_LOG` override
//! - Structured JSON logging (optional)
//! - Cleanup of old log files on startup

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use chrono::Utc;
use lazy_static::lazy_static;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

const LOG_FILE_PREFIX: &str = "campaign-harvester";

/// UTC timestamps with millisecond precision
struct UtcTimeFormatter;

impl FormatTime for UtcTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC"))
    }
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Build the filter: `RUST_LOG` wins, otherwise the configured level with
/// parser and HTTP internals capped unless tracing everything.
fn build_filter(level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", level, e))?;
    if !level.to_lowercase().contains("trace") {
        for directive in [
            "reqwest=info",
            "hyper=warn",
            "hyper_util=warn",
            "h2=warn",
            "html5ever=warn",
            "selectors=warn",
        ] {
            filter = filter.add_directive(directive.parse()?);
        }
        filter = filter.add_directive(format!("campaign_harvester_lib={}", level).parse()?);
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// RUST_LOG="debug,reqwest=debug" campaign-harvester run
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = Registry::default().with(env_filter);

    let mut log_dir = None;
    let file_writer = if config.file_output {
        let dir = config.log_dir.clone().unwrap_or_else(get_log_directory);
        std::fs::create_dir_all(&dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", dir, e))?;
        if config.auto_cleanup_logs {
            cleanup_old_logs(&dir, config.max_files)?;
        }

        let file_appender = rolling::daily(&dir, format!("{}.log", LOG_FILE_PREFIX));
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        log_dir = Some(dir);
        Some(file_writer)
    } else {
        None
    };

    if !config.console_output && file_writer.is_none() {
        return Err(anyhow!("No logging output configured"));
    }

    if config.json_format {
        let console_layer = config.console_output.then(|| {
            fmt::Layer::new()
                .json()
                .with_writer(std::io::stderr)
                .with_timer(UtcTimeFormatter)
        });
        let file_layer = file_writer.map(|writer| {
            fmt::Layer::new()
                .json()
                .with_writer(writer)
                .with_timer(UtcTimeFormatter)
                .with_thread_ids(true)
                .with_ansi(false)
        });
        registry.with(console_layer).with(file_layer).try_init()?;
    } else {
        let console_layer = config.console_output.then(|| {
            fmt::Layer::new()
                .with_writer(std::io::stderr)
                .with_timer(UtcTimeFormatter)
                .with_target(false)
        });
        // File layer with module targets and no ANSI color codes
        let file_layer = file_writer.map(|writer| {
            fmt::Layer::new()
                .with_writer(writer)
                .with_timer(UtcTimeFormatter)
                .with_target(true)
                .with_ansi(false)
        });
        registry.with(console_layer).with(file_layer).try_init()?;
    }

    info!(
        level = %config.level,
        json = config.json_format,
        console = config.console_output,
        log_dir = ?log_dir,
        "Logging system initialized"
    );
    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Campaign Harvester System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);
    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
}

/// Remove all but the newest `max_files` log files
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(max_files as usize) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        }
    }
    Ok(())
}
