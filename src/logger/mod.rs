//! Logger module
//!
//! Installs the `tracing` subscriber and provides logging helpers for the
//! server lifecycle. Two outputs are kept apart, as in classic web servers:
//! - access records (target [`ACCESS_TARGET`]) go to the access log file or stdout
//! - everything else goes to the error log file or stderr

mod format;

pub use format::AccessLogEntry;

use std::fs::{File, OpenOptions};
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Mutex;
use tracing_subscriber::filter::{filter_fn, EnvFilter};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use crate::config::{Config, LoggingConfig};

/// Target of access log records
pub const ACCESS_TARGET: &str = "access";

/// Target of error-pipeline diagnostic records
pub const DIAGNOSTIC_TARGET: &str = "diagnostic";

/// Initialize the logger with configuration
///
/// Should be called once at application startup. `RUST_LOG` takes
/// precedence over `logging.level`.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let access_writer = match config.access_log_file.as_deref() {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(io::stdout),
    };
    let error_writer = match config.error_log_file.as_deref() {
        Some(path) => BoxMakeWriter::new(Mutex::new(open_log_file(path)?)),
        None => BoxMakeWriter::new(io::stderr),
    };

    let access_layer = tracing_subscriber::fmt::layer()
        .with_writer(access_writer)
        .with_target(false)
        .with_level(false)
        .without_time()
        .with_ansi(false)
        .with_filter(filter_fn(|meta| meta.target() == ACCESS_TARGET));
    let error_layer = tracing_subscriber::fmt::layer()
        .with_writer(error_writer)
        .with_ansi(config.error_log_file.is_none())
        .with_filter(filter_fn(|meta| meta.target() != ACCESS_TARGET));

    tracing_subscriber::registry()
        .with(filter)
        .with(access_layer)
        .with(error_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::AlreadyExists, e))
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    tracing::info!("======================================");
    tracing::info!("microweb server started");
    tracing::info!("Listening on: http://{addr}");
    tracing::info!("Adapter: {}", config.server.adapter);
    tracing::info!("Log level: {}", config.logging.level);
    if let Some(workers) = config.server.workers {
        tracing::info!("Worker threads: {workers}");
    }
    if let Some(ref path) = config.logging.access_log_file {
        tracing::info!("Access log: {path}");
    }
    if let Some(ref path) = config.logging.error_log_file {
        tracing::info!("Error log: {path}");
    }
    tracing::info!("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    tracing::debug!(%peer_addr, "connection accepted");
}

pub fn log_connection_error(err: &impl std::fmt::Debug) {
    tracing::error!("failed to serve connection: {err:?}");
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    tracing::info!(target: ACCESS_TARGET, "{}", entry.format(format));
}

/// Emit a diagnostic record written by the error pipeline
pub fn log_diagnostic(record: &str) {
    tracing::error!(target: DIAGNOSTIC_TARGET, "{}", record.trim_end());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_log_file_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/access.log");
        open_log_file(path.to_str().unwrap()).unwrap();
        assert!(path.exists());
    }
}
