//! Tracing setup.
//!
//! Console output always goes to stderr; stdout belongs to the stdio transport. A second,
//! non-blocking layer appends to a log file chosen by `MNEMO_LOG_FILE` (default
//! `logs/mnemo-mcp.log`, `off` disables it).
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "MNEMO_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/mnemo-mcp.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber. `RUST_LOG` controls filtering (default `info`).
///
/// Later calls are no-ops, so tests and the binary can both call it.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    let log_path = resolve_log_path(std::env::var(LOG_FILE_ENV).ok());
    let file_layer = log_path.as_deref().and_then(open_writer).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        if let Some(path) = log_path {
            tracing::debug!(path = %path.display(), "File logging enabled");
        }
    }
}

fn resolve_log_path(configured: Option<String>) -> Option<PathBuf> {
    match configured.as_deref().map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("off") => None,
        Some(value) if !value.is_empty() => Some(PathBuf::from(value)),
        _ => Some(PathBuf::from(DEFAULT_LOG_FILE)),
    }
}

/// Returns `None` when the parent directory or the file cannot be created.
fn open_writer(path: &Path) -> Option<NonBlocking> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if let Err(err) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {err}", parent.display());
            return None;
        }
    }
    match OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            let _ = LOG_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Failed to open log file {}: {err}", path.display());
            None
        }
    }
}
