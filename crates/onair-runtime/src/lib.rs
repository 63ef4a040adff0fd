//! Scheduler and event bridge between a host and the capture pipeline.
//!
//! [`Runtime`] owns a dedicated worker thread running a current-thread tokio
//! runtime. Host calls are plain synchronous methods: they enqueue a command
//! and, where an answer is needed, wait for it with the configured timeout.

pub mod error;
pub mod logging;
pub mod sink;
pub mod thumbs;
mod worker;

use std::sync::mpsc::{self as std_mpsc, RecvTimeoutError};
use std::thread::JoinHandle;
use std::time::Duration;

use onair_core::debug_log::{shared_event_log, EventEntry, SharedEventLog};
use onair_core::{CaptureSource, Config};
use onair_detect::{NativeBackend, SessionBackend, WindowInfo};
use serde_json::{Map, Value as JsonValue};
use tokio::sync::mpsc;
use tracing::{error, warn};

pub use error::RuntimeError;
pub use logging::LogHandle;
pub use sink::{DisplaySink, SinkError, TargetKind};
pub use thumbs::ThumbnailStore;
pub use worker::{WindowProvider, BLOCKING_POOL_SIZE, NATIVE_RETRY_INTERVAL};

use worker::{BackendFactory, Command, Worker, WorkerParts};

/// How long [`Runtime::shutdown`] waits for the worker thread.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Grace period for in-flight blocking tasks once the worker loop exits.
const BLOCKING_GRACE: Duration = Duration::from_secs(1);

/// Configures and starts a [`Runtime`].
pub struct RuntimeBuilder<S, B> {
    sink: S,
    backend: BackendFactory<B>,
    windows: WindowProvider,
    config: Config,
    extra_sources: Vec<Box<dyn CaptureSource>>,
    log: Option<LogHandle>,
    retry_interval: Duration,
}

impl<S: DisplaySink, B: SessionBackend + 'static> RuntimeBuilder<S, B> {
    /// Use another session backend. `factory` runs on the worker thread.
    pub fn with_backend<B2, F>(self, factory: F) -> RuntimeBuilder<S, B2>
    where
        B2: SessionBackend + 'static,
        F: FnMut() -> B2 + Send + 'static,
    {
        RuntimeBuilder {
            sink: self.sink,
            backend: Box::new(factory),
            windows: self.windows,
            config: self.config,
            extra_sources: self.extra_sources,
            log: self.log,
            retry_interval: self.retry_interval,
        }
    }

    pub fn with_window_provider<F>(mut self, provider: F) -> Self
    where
        F: Fn() -> Vec<WindowInfo> + Send + Sync + 'static,
    {
        self.windows = std::sync::Arc::new(provider);
        self
    }

    /// Initial settings. Defaults to the built-in configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config.validated();
        self
    }

    /// Add a capture source after the built-in ones, or replace one with the same id.
    pub fn with_source(mut self, source: Box<dyn CaptureSource>) -> Self {
        self.extra_sources.push(source);
        self
    }

    /// Let settings changes adjust the log level.
    pub fn with_log_handle(mut self, log: LogHandle) -> Self {
        self.log = Some(log);
        self
    }

    /// How long to wait before reconnecting a failed native session manager.
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn spawn(self) -> Result<Runtime, RuntimeError> {
        let capture_timeout = Duration::from_millis(self.config.general.capture_timeout_ms);
        let events = shared_event_log();
        let parts = WorkerParts {
            config: self.config,
            sink: self.sink,
            backend: self.backend,
            windows: self.windows,
            extra_sources: self.extra_sources,
            events: events.clone(),
            log: self.log,
            retry_interval: self.retry_interval,
        };

        let (commands, rx) = mpsc::unbounded_channel();
        let (done_tx, done) = std_mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("onair-worker".into())
            .spawn(move || {
                let _done = done_tx;
                let rt = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .max_blocking_threads(BLOCKING_POOL_SIZE)
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        error!("Failed to build worker runtime: {e}");
                        return;
                    }
                };
                rt.block_on(Worker::new(parts).run(rx));
                rt.shutdown_timeout(BLOCKING_GRACE);
            })
            .map_err(RuntimeError::Spawn)?;

        Ok(Runtime {
            commands,
            events,
            capture_timeout,
            done,
            thread: Some(thread),
        })
    }
}

/// Handle to a running capture pipeline.
///
/// Dropping it shuts the worker down.
pub struct Runtime {
    commands: mpsc::UnboundedSender<Command>,
    events: SharedEventLog,
    capture_timeout: Duration,
    done: std_mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Builder with the platform's native backend and window enumerator.
    pub fn builder<S: DisplaySink>(sink: S) -> RuntimeBuilder<S, NativeBackend> {
        RuntimeBuilder {
            sink,
            backend: Box::new(NativeBackend::default),
            windows: std::sync::Arc::new(onair_detect::enumerate_windows),
            config: Config::default(),
            extra_sources: Vec::new(),
            log: None,
            retry_interval: NATIVE_RETRY_INTERVAL,
        }
    }

    /// Send `command` and wait for its reply.
    fn request<T>(
        &self,
        command: impl FnOnce(std_mpsc::SyncSender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (reply, answer) = std_mpsc::sync_channel(1);
        self.commands
            .send(command(reply))
            .map_err(|_| RuntimeError::WorkerGone)?;
        answer
            .recv_timeout(self.capture_timeout)
            .map_err(|e| match e {
                RecvTimeoutError::Timeout => RuntimeError::Timeout(self.capture_timeout),
                RecvTimeoutError::Disconnected => RuntimeError::WorkerGone,
            })
    }

    /// Replace the settings with the host's flat settings object.
    pub fn apply_settings(
        &mut self,
        settings: &Map<String, JsonValue>,
    ) -> Result<(), RuntimeError> {
        self.apply_config(Config::from_host_settings(settings))
    }

    /// Replace the settings wholesale and wait until the worker has them.
    pub fn apply_config(&mut self, config: Config) -> Result<(), RuntimeError> {
        let config = config.validated();
        self.capture_timeout = Duration::from_millis(config.general.capture_timeout_ms);
        let config = Box::new(config);
        self.request(|reply| Command::Apply { config, reply })
    }

    /// Capture and render now. `None` when the worker does not answer in time.
    pub fn refresh(&self) -> Option<String> {
        match self.request(|reply| Command::Refresh { reply }) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Refresh failed: {e}");
                None
            }
        }
    }

    /// Display targets the sink offers for `kind`.
    pub fn targets(&self, kind: TargetKind) -> Vec<String> {
        self.request(|reply| Command::Targets { kind, reply })
            .unwrap_or_else(|e| {
                warn!("Listing display targets failed: {e}");
                Vec::new()
            })
    }

    /// Recent pipeline events, oldest first.
    pub fn events(&self) -> Vec<EventEntry> {
        match self.events.lock() {
            Ok(log) => log.snapshot(),
            Err(_) => Vec::new(),
        }
    }

    /// Stop the worker and wait up to [`SHUTDOWN_TIMEOUT`] for it. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        let _ = self.commands.send(Command::Shutdown);
        match self.done.recv_timeout(SHUTDOWN_TIMEOUT) {
            Err(RecvTimeoutError::Timeout) => {
                warn!("Worker did not stop within {SHUTDOWN_TIMEOUT:?}, detaching");
            }
            _ => {
                if thread.join().is_err() {
                    error!("Worker thread panicked");
                }
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}
