//! Process-wide `tracing` setup with a level the host can change at runtime.

use std::path::Path;
use std::sync::Arc;

use onair_core::LogLevel;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use crate::error::RuntimeError;

/// Live control over the installed subscriber.
///
/// Holds the log file writer's guard; pending lines are flushed when the
/// last clone is dropped.
#[derive(Clone)]
pub struct LogHandle {
    filter: reload::Handle<EnvFilter, Registry>,
    _guard: Option<Arc<WorkerGuard>>,
}

impl LogHandle {
    pub fn set_level(&self, level: LogLevel) -> Result<(), RuntimeError> {
        self.filter
            .reload(filter_for(level))
            .map_err(|e| RuntimeError::Logging(e.to_string()))
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("file", &self._guard.is_some())
            .finish()
    }
}

fn filter_for(level: LogLevel) -> EnvFilter {
    EnvFilter::new(level.directive())
}

/// Install the global subscriber: stderr, plus `log_file` when given.
///
/// `RUST_LOG` wins over `level` until the host first changes the level.
pub fn init(level: LogLevel, log_file: Option<&Path>) -> Result<LogHandle, RuntimeError> {
    let initial = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for(level));
    let (filter, handle) = reload::Layer::new(initial);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().ok_or_else(|| {
                RuntimeError::Logging(format!("not a file path: {}", path.display()))
            })?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(Arc::new(guard)))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| RuntimeError::Logging(e.to_string()))?;

    Ok(LogHandle {
        filter: handle,
        _guard: guard,
    })
}
