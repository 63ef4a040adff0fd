//! The worker loop: one thread, one current-thread tokio runtime.
//!
//! Everything that touches the native session client, the capture sources,
//! the renderer or the display sink runs here. The host thread only sends
//! [`Command`]s and waits on bounded replies.

use std::sync::mpsc::SyncSender;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use onair_core::debug_log::{self, DebugEvent, SharedEventLog};
use onair_core::{
    capture_all, select_canonical, Aggregator, CaptureContext, CaptureSource, Config, CycleKind,
    NativeSnapshot, NativeSnapshotSource, Renderer, SourceCatalog,
};
use onair_detect::{
    ClientState, DetectError, MediaRecord, SessionBackend, SessionClient, SessionEvent,
    SessionEventKind, WindowInfo, NATIVE_SOURCE_ID,
};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::logging::LogHandle;
use crate::sink::{DisplaySink, TargetKind};
use crate::thumbs::ThumbnailStore;

/// How often a failed native initialization is retried.
pub const NATIVE_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Threads in the blocking pool (window enumeration, file I/O).
pub const BLOCKING_POOL_SIZE: usize = 4;

/// Produces the visible window list. Called on the blocking pool.
pub type WindowProvider = Arc<dyn Fn() -> Vec<WindowInfo> + Send + Sync>;

/// Creates a session backend inside the worker thread.
pub type BackendFactory<B> = Box<dyn FnMut() -> B + Send>;

pub(crate) enum Command {
    Apply {
        config: Box<Config>,
        reply: SyncSender<()>,
    },
    Refresh {
        reply: SyncSender<String>,
    },
    Targets {
        kind: TargetKind,
        reply: SyncSender<Vec<String>>,
    },
    Shutdown,
}

/// Everything the worker needs, moved into its thread.
pub(crate) struct WorkerParts<S, B> {
    pub config: Config,
    pub sink: S,
    pub backend: BackendFactory<B>,
    pub windows: WindowProvider,
    pub extra_sources: Vec<Box<dyn CaptureSource>>,
    pub events: SharedEventLog,
    pub log: Option<LogHandle>,
    pub retry_interval: Duration,
}

pub(crate) struct Worker<S, B: SessionBackend> {
    config: Config,
    sink: S,
    backend: BackendFactory<B>,
    client: Option<SessionClient<B>>,
    /// Events of the current client; replaced with a fresh channel per client.
    session_rx: mpsc::UnboundedReceiver<SessionEvent>,
    native_unsupported: bool,
    native_tx: watch::Sender<NativeSnapshot>,
    catalog: SourceCatalog,
    aggregator: Aggregator,
    renderer: Renderer,
    windows: WindowProvider,
    thumbs: Option<ThumbnailStore>,
    events: SharedEventLog,
    log: Option<LogHandle>,
    retry_interval: Duration,
    last_text: Option<String>,
}

fn closed_channel() -> mpsc::UnboundedReceiver<SessionEvent> {
    let (_, rx) = mpsc::unbounded_channel();
    rx
}

/// Interval whose first tick is at `start`. Late ticks push the schedule back.
fn timer(period: Duration, start: Instant) -> Interval {
    let mut interval = time::interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

impl<S: DisplaySink, B: SessionBackend> Worker<S, B> {
    pub(crate) fn new(parts: WorkerParts<S, B>) -> Self {
        let WorkerParts {
            config,
            sink,
            backend,
            windows,
            extra_sources,
            events,
            log,
            retry_interval,
        } = parts;

        let (native_tx, native_rx) = watch::channel(None);
        let mut catalog =
            SourceCatalog::standard(Some(Box::new(NativeSnapshotSource::new(native_rx))));
        for source in extra_sources {
            catalog.register(source);
        }
        catalog.apply_config(&config);

        let thumbs = match ThumbnailStore::new() {
            Ok(store) => Some(store),
            Err(e) => {
                warn!("Album art disabled, no scratch directory: {e}");
                None
            }
        };

        Self {
            renderer: Renderer::from_config(&config.display),
            config,
            sink,
            backend,
            client: None,
            session_rx: closed_channel(),
            native_unsupported: false,
            native_tx,
            catalog,
            aggregator: Aggregator::new(),
            windows,
            thumbs,
            events,
            log,
            retry_interval,
            last_text: None,
        }
    }

    fn record(&self, event: DebugEvent) {
        debug_log::record(&self.events, event);
    }

    fn is_running(&self) -> bool {
        self.config.general.enabled
    }

    fn native_wanted(&self) -> bool {
        self.is_running() && self.catalog.is_enabled(NATIVE_SOURCE_ID) && !self.native_unsupported
    }

    fn needs_native_retry(&self) -> bool {
        self.native_wanted()
            && self
                .client
                .as_ref()
                .map_or(true, |c| c.state() == ClientState::Uninitialized)
    }

    fn has_native_session(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.has_session())
    }

    fn poll_timer(&self) -> Interval {
        let period = Duration::from_millis(self.config.general.check_frequency);
        timer(period, Instant::now())
    }

    fn refresh_timer(&self) -> Interval {
        let period = Duration::from_millis(self.config.general.refresh_interval);
        timer(period, Instant::now())
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Worker started");
        if self.native_wanted() {
            self.start_native().await;
        }

        let mut poll = self.poll_timer();
        let mut refresh = self.refresh_timer();
        let mut retry = timer(self.retry_interval, Instant::now() + self.retry_interval);

        loop {
            let running = self.is_running();
            let live = running && self.has_native_session();
            let retry_due = self.needs_native_retry();

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    match command {
                        Command::Apply { config, reply } => {
                            if self.apply(*config).await {
                                poll = self.poll_timer();
                                refresh = self.refresh_timer();
                            }
                            let _ = reply.send(());
                        }
                        Command::Refresh { reply } => {
                            self.refresh_native(false).await;
                            let text = self.cycle(CycleKind::Full).await;
                            let _ = reply.send(text);
                        }
                        Command::Targets { kind, reply } => {
                            let _ = reply.send(self.sink.list_targets(kind));
                        }
                        Command::Shutdown => break,
                    }
                }
                Some(event) = self.session_rx.recv() => self.on_session_event(event).await,
                _ = poll.tick(), if running => {
                    self.cycle(CycleKind::Full).await;
                }
                _ = refresh.tick(), if live => {
                    self.cycle(CycleKind::Refresh).await;
                }
                _ = retry.tick(), if retry_due => self.start_native().await,
            }
        }

        self.stop_native();
        info!("Worker stopped");
    }

    /// Swap in a new settings snapshot. Returns whether the timers need rebuilding.
    async fn apply(&mut self, config: Config) -> bool {
        let previous = std::mem::replace(&mut self.config, config);

        if previous.general.log_level != self.config.general.log_level {
            if let Some(log) = &self.log {
                if let Err(e) = log.set_level(self.config.general.log_level) {
                    warn!("{e}");
                }
            }
        }

        self.catalog.apply_config(&self.config);
        self.renderer = Renderer::from_config(&self.config.display);
        self.last_text = None;

        if !self.is_running() {
            if previous.general.enabled {
                info!("Capture disabled");
                self.stop_native();
                self.aggregator.clear();
                let target = &self.config.display.source_name;
                if let Err(e) = self.sink.set_text(target, "") {
                    warn!(target = %target, "Failed to clear display: {e}");
                }
            }
        } else if self.native_wanted() {
            self.start_native().await;
        } else {
            self.stop_native();
        }

        if previous.display.thumbsource_name != self.config.display.thumbsource_name {
            let snapshot = self.native_tx.borrow().clone();
            self.update_thumbnail(snapshot.as_deref()).await;
        }

        previous.general.check_frequency != self.config.general.check_frequency
            || previous.general.refresh_interval != self.config.general.refresh_interval
    }

    async fn start_native(&mut self) {
        if self.native_unsupported {
            return;
        }
        let client = self
            .client
            .get_or_insert_with(|| SessionClient::new((self.backend)()));
        if client.state() != ClientState::Uninitialized {
            return;
        }

        match client.initialize().await {
            Ok(()) => {}
            Err(DetectError::Unsupported) => {
                info!("No native media session facility on this host");
                self.native_unsupported = true;
                self.client = None;
                return;
            }
            Err(e) => {
                self.record(DebugEvent::NativeInitFailed {
                    message: e.to_string(),
                });
                return;
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.session_rx = rx;
        if let Err(e) = client.subscribe(tx).await {
            self.record(DebugEvent::NativeInitFailed {
                message: e.to_string(),
            });
            return;
        }

        let event = DebugEvent::SessionReplaced {
            generation: client.generation(),
            has_session: client.has_session(),
        };
        self.record(event);
        self.refresh_native(true).await;
    }

    fn stop_native(&mut self) {
        if let Some(mut client) = self.client.take() {
            client.teardown();
        }
        // Queued events of the old client are dropped with the receiver.
        self.session_rx = closed_channel();
        self.native_tx.send_replace(None);
    }

    async fn on_session_event(&mut self, event: SessionEvent) {
        let Some(client) = self.client.as_mut() else {
            return;
        };
        if !client.is_current(&event) {
            trace!(generation = event.generation, "Dropping stale session event");
            return;
        }
        debug!(kind = ?event.kind, "Session event");

        if event.kind == SessionEventKind::SessionChanged {
            match client.refresh_session().await {
                Ok(generation) => {
                    let has_session = client.has_session();
                    self.record(DebugEvent::SessionReplaced {
                        generation,
                        has_session,
                    });
                }
                Err(e) => warn!("Failed to switch media session: {e}"),
            }
        }

        self.refresh_native(event.kind.refetch_thumbnail()).await;
        self.cycle(CycleKind::Full).await;
    }

    /// Re-read the native session and publish the snapshot to the native source.
    async fn refresh_native(&mut self, refetch_thumbnail: bool) {
        let snapshot = match &self.client {
            Some(client) => client.capture_snapshot().await.map(Arc::new),
            None => None,
        };
        self.native_tx.send_replace(snapshot.clone());
        if refetch_thumbnail {
            self.update_thumbnail(snapshot.as_deref()).await;
        }
    }

    async fn update_thumbnail(&mut self, record: Option<&MediaRecord>) {
        let target = self.config.display.thumbsource_name.clone();
        if target.is_empty() {
            return;
        }
        let Some(store) = self.thumbs.as_mut() else {
            return;
        };

        let path = match (record.and_then(|r| r.thumbnail.as_ref()), &self.client) {
            (Some(thumbnail), Some(client)) => {
                let bytes = match client.fetch_thumbnail(thumbnail).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(thumbnail = %thumbnail.describe(), "Failed to fetch album art: {e}");
                        return;
                    }
                };
                match store.store(bytes).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("Failed to write album art: {e}");
                        return;
                    }
                }
            }
            _ => {
                store.clear().await;
                None
            }
        };

        if let Err(e) = self.sink.set_image(&target, path.as_deref()) {
            warn!(target = %target, "Failed to update image target: {e}");
            return;
        }
        debug!(path = ?path, "Album art updated");
        self.record(DebugEvent::ThumbnailUpdated {
            path: path.map(|p| p.display().to_string()),
        });
    }

    async fn windows(&self) -> Vec<WindowInfo> {
        let provider = Arc::clone(&self.windows);
        match tokio::task::spawn_blocking(move || provider()).await {
            Ok(windows) => windows,
            Err(e) => {
                warn!("Window enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    async fn capture(&mut self) -> Option<MediaRecord> {
        let windows = if self.catalog.needs_windows() {
            self.windows().await
        } else {
            Vec::new()
        };
        let ctx = CaptureContext::new(windows);

        let report = capture_all(self.catalog.enabled(), &ctx).await;
        for failure in &report.failures {
            self.record(DebugEvent::SourceFailed {
                source: failure.source.clone(),
                message: failure.message.clone(),
            });
        }
        self.record(DebugEvent::CaptureTick {
            full: true,
            sources_run: self.catalog.enabled().count() as u32,
            records_found: report.records.len() as u32,
        });
        select_canonical(report.records)
    }

    /// Run one cycle, push the text to the sink, and return it.
    async fn cycle(&mut self, kind: CycleKind) -> String {
        let selected = match kind {
            CycleKind::Full => self.capture().await,
            CycleKind::Refresh => None,
        };

        let previous = self.aggregator.current();
        let current = self.aggregator.commit(kind, selected);
        if let Some(record) = &current {
            let changed = previous.as_ref().map_or(true, |p| {
                (&p.source, &p.artist, &p.title) != (&record.source, &record.artist, &record.title)
            });
            if changed {
                self.record(DebugEvent::Selected {
                    source: record.source.clone(),
                    artist: record.artist.clone(),
                    title: record.title.clone(),
                });
            }
        }

        let text = match self.renderer.try_render(current.as_deref(), Utc::now()) {
            Ok(text) => text,
            Err(e) => {
                warn!("Render failed, showing fallback: {e}");
                self.record(DebugEvent::RenderFailed {
                    message: e.to_string(),
                });
                self.config.display.fallback_text.clone()
            }
        };

        if self.last_text.as_deref() != Some(text.as_str()) {
            let target = &self.config.display.source_name;
            match self.sink.set_text(target, &text) {
                Ok(()) => {
                    self.record(DebugEvent::Rendered { text: text.clone() });
                    self.last_text = Some(text.clone());
                }
                Err(e) => warn!(target = %target, "Failed to update text target: {e}"),
            }
        }
        text
    }
}
