//! Logging for the clofii CLI using tracing
//!
//! Logs go to the clofii log file (see `PathManager::log_file_path`), or to
//! stderr when no log file can be opened. `--verbose` mirrors them to stderr.

use config::PathManager;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,clofii_core=debug,llm=info";

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install the global subscriber. Keep the returned guard alive until exit
/// or buffered log lines are lost.
pub fn init_logging(verbose: bool) -> Option<WorkerGuard> {
    let Some(path) = PathManager::log_file_path() else {
        init_stderr_logging();
        return None;
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("[clofii] Failed to create log directory {:?}: {}", parent, e);
        }
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("[clofii] Failed to open log file {:?}: {}", path, e);
            init_stderr_logging();
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);
    let stderr_layer = verbose.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
    });

    let installed = tracing_subscriber::registry()
        .with(filter())
        .with(file_layer)
        .with(stderr_layer)
        .try_init();
    match installed {
        Ok(()) => tracing::info!("Logging initialized, writing to {:?}", path),
        Err(e) => eprintln!("[clofii] Failed to set tracing subscriber: {}", e),
    }
    Some(guard)
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::registry()
        .with(filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
        .try_init();
}
