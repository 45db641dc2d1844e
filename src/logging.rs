//! Tracing setup: human-readable output on stderr plus an optional
//! non-blocking log file. `RUST_LOG` overrides the configured level.

use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

use crate::config::LoggingConfig;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level {level:?}: {source}")]
    Filter {
        level: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to prepare log directory {path}: {source}")]
    CreateDir { path: PathBuf, source: std::io::Error },
    #[error("log file path {0} has no file name")]
    FileName(PathBuf),
    #[error("failed to install global tracing subscriber: {0}")]
    SetGlobal(#[from] tracing::subscriber::SetGlobalDefaultError),
}

fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|source| LoggingError::Filter {
        level: level.to_string(),
        source,
    })
}

/// Install the global subscriber. A second call is a no-op.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    if LOG_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = build_filter(&config.level)?;
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let file_layer = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let name = path
                .file_name()
                .ok_or_else(|| LoggingError::FileName(path.clone()))?;
            fs::create_dir_all(&dir).map_err(|source| LoggingError::CreateDir {
                path: dir.clone(),
                source,
            })?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = LOG_GUARD.set(guard);
            Some(fmt::layer().with_ansi(false).with_writer(writer))
        }
        None => None,
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &config.file {
        tracing::debug!(path = %path.display(), "logging to file");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_level() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        assert!(matches!(build_filter("info,=[bad"), Err(LoggingError::Filter { .. })));
    }

    #[test]
    fn accepts_directives() {
        assert!(build_filter("mediawatch=debug,warn").is_ok());
    }
}
