use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use onair_core::debug_log::DebugEvent;
use onair_core::{CaptureContext, CaptureSource, Config, DisplayMode, OnairError};
use onair_detect::{
    DetectError, EventSender, MediaRecord, NullBackend, SessionBackend, SessionEvent,
    SessionEventKind, ThumbnailRef, WindowInfo, NATIVE_SOURCE_ID,
};
use onair_runtime::{DisplaySink, Runtime, SinkError, TargetKind};

#[derive(Debug, Clone, PartialEq)]
enum Update {
    Text(String, String),
    Image(String, Option<PathBuf>),
}

#[derive(Clone, Default)]
struct RecordingSink {
    updates: Arc<Mutex<Vec<Update>>>,
}

impl RecordingSink {
    fn texts(&self) -> Vec<String> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                Update::Text(_, text) => Some(text.clone()),
                Update::Image(..) => None,
            })
            .collect()
    }

    fn images(&self) -> Vec<Option<PathBuf>> {
        self.updates
            .lock()
            .unwrap()
            .iter()
            .filter_map(|u| match u {
                Update::Image(_, path) => Some(path.clone()),
                Update::Text(..) => None,
            })
            .collect()
    }
}

impl DisplaySink for RecordingSink {
    fn set_text(&mut self, target: &str, text: &str) -> Result<(), SinkError> {
        self.updates
            .lock()
            .unwrap()
            .push(Update::Text(target.to_string(), text.to_string()));
        Ok(())
    }

    fn set_image(&mut self, target: &str, path: Option<&Path>) -> Result<(), SinkError> {
        self.updates
            .lock()
            .unwrap()
            .push(Update::Image(target.to_string(), path.map(Path::to_path_buf)));
        Ok(())
    }

    fn list_targets(&self, kind: TargetKind) -> Vec<String> {
        match kind {
            TargetKind::Text => vec!["Now Playing".into()],
            TargetKind::Image => Vec::new(),
        }
    }
}

struct FixedSource {
    id: &'static str,
    record: Option<(&'static str, &'static str)>,
}

impl CaptureSource for FixedSource {
    fn id(&self) -> &str {
        self.id
    }

    fn display_name(&self) -> &str {
        self.id
    }

    fn capture<'a>(
        &'a self,
        _ctx: &'a CaptureContext,
    ) -> BoxFuture<'a, Result<Option<MediaRecord>, OnairError>> {
        Box::pin(async move {
            Ok(self
                .record
                .map(|(artist, title)| MediaRecord::new(self.id, artist, title)))
        })
    }
}

struct FailingSource;

impl CaptureSource for FailingSource {
    fn id(&self) -> &str {
        "broken"
    }

    fn display_name(&self) -> &str {
        "Broken"
    }

    fn capture<'a>(
        &'a self,
        _ctx: &'a CaptureContext,
    ) -> BoxFuture<'a, Result<Option<MediaRecord>, OnairError>> {
        Box::pin(async { Err(OnairError::Config("player went away".into())) })
    }
}

/// OS media state behind [`FakeSessions`].
#[derive(Default)]
struct SessionState {
    current: Option<u32>,
    title: &'static str,
    art: bool,
    connect_failures: u32,
    connects: u32,
    snapshots: u32,
    art_fetches: u32,
    manager: Option<EventSender>,
    watcher: Option<(u64, EventSender)>,
}

/// Session backend whose media state the test drives.
#[derive(Clone, Default)]
struct FakeSessions(Arc<Mutex<SessionState>>);

impl FakeSessions {
    fn playing(title: &'static str, art: bool) -> Self {
        let sessions = Self::default();
        {
            let mut state = sessions.state();
            state.current = Some(1);
            state.title = title;
            state.art = art;
        }
        sessions
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap()
    }

    fn generation(&self) -> Option<u64> {
        self.state().watcher.as_ref().map(|(generation, _)| *generation)
    }

    /// Fire a callback of the watched session.
    fn fire(&self, kind: SessionEventKind) {
        let state = self.state();
        let (generation, tx) = state.watcher.as_ref().expect("no watched session");
        tx.send(SessionEvent {
            generation: *generation,
            kind,
        })
        .unwrap();
    }

    fn switch_to(&self, session: u32) {
        let manager = {
            let mut state = self.state();
            state.current = Some(session);
            state.manager.clone().expect("manager not watched")
        };
        manager
            .send(SessionEvent::manager(SessionEventKind::SessionChanged))
            .unwrap();
    }
}

impl SessionBackend for FakeSessions {
    type Session = u32;
    type Watch = ();
    type ManagerWatch = ();

    async fn connect(&mut self) -> Result<(), DetectError> {
        let mut state = self.state();
        state.connects += 1;
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(DetectError::Backend("session manager unavailable".into()));
        }
        Ok(())
    }

    async fn current_session(&mut self) -> Result<Option<u32>, DetectError> {
        Ok(self.state().current)
    }

    async fn snapshot(&self, session: &u32) -> Result<Option<MediaRecord>, DetectError> {
        let mut state = self.state();
        state.snapshots += 1;
        let mut record = MediaRecord::new(NATIVE_SOURCE_ID, "Boards of Canada", state.title);
        if state.art {
            record.thumbnail = Some(ThumbnailRef::Url(format!("file:///art/{session}.png")));
        }
        Ok(Some(record))
    }

    async fn fetch_thumbnail(&self, _thumbnail: &ThumbnailRef) -> Result<Vec<u8>, DetectError> {
        self.state().art_fetches += 1;
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    fn watch_manager(&mut self, events: EventSender) -> Result<(), DetectError> {
        self.state().manager = Some(events);
        Ok(())
    }

    fn unwatch_manager(&mut self, _watch: ()) {
        self.state().manager = None;
    }

    fn watch_session(
        &mut self,
        _session: &u32,
        generation: u64,
        events: EventSender,
    ) -> Result<(), DetectError> {
        self.state().watcher = Some((generation, events));
        Ok(())
    }

    fn unwatch_session(&mut self, _session: &u32, _watch: ()) {
        self.state().watcher = None;
    }

    fn disconnect(&mut self) {}
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn native_config() -> Config {
    let mut config = template_config("%artist - %title");
    config.display.thumbsource_name = "Art".into();
    config
}

fn spawn_native(sessions: &FakeSessions, sink: &RecordingSink) -> Runtime {
    let backend = sessions.clone();
    Runtime::builder(sink.clone())
        .with_backend(move || backend.clone())
        .with_window_provider(Vec::new)
        .with_config(native_config())
        .with_retry_interval(Duration::from_millis(50))
        .spawn()
        .unwrap()
}

fn vlc_window() -> Vec<WindowInfo> {
    vec![WindowInfo::new(
        1,
        r"C:\Program Files\VideoLAN\VLC\vlc.exe",
        "Radiohead - Creep - VLC media player",
    )]
}

fn template_config(text: &str) -> Config {
    let mut config = Config::default();
    config.display.mode = DisplayMode::Template;
    config.display.text = text.to_string();
    config
}

#[test]
fn test_refresh_renders_window_title() {
    let sink = RecordingSink::default();
    let mut runtime = Runtime::builder(sink.clone())
        .with_backend(|| NullBackend)
        .with_window_provider(vlc_window)
        .with_config(template_config("%artist - %title"))
        .spawn()
        .unwrap();

    assert_eq!(runtime.refresh().as_deref(), Some("Radiohead - Creep"));
    assert!(sink.texts().contains(&"Radiohead - Creep".to_string()));

    runtime.shutdown();
}

#[test]
fn test_expression_without_media() {
    let sink = RecordingSink::default();
    let runtime = Runtime::builder(sink)
        .with_backend(|| NullBackend)
        .with_window_provider(Vec::new)
        .spawn()
        .unwrap();

    assert_eq!(runtime.refresh().as_deref(), Some("NO MEDIA"));
}

#[test]
fn test_registered_source_and_failures() {
    let sink = RecordingSink::default();
    let runtime = Runtime::builder(sink)
        .with_backend(|| NullBackend)
        .with_window_provider(Vec::new)
        .with_config(template_config("%title by %artist"))
        .with_source(Box::new(FailingSource))
        .with_source(Box::new(FixedSource {
            id: "fixed",
            record: Some(("Portishead", "Roads")),
        }))
        .spawn()
        .unwrap();

    assert_eq!(runtime.refresh().as_deref(), Some("Roads by Portishead"));

    let events = runtime.events();
    assert!(events.iter().any(|e| matches!(
        &e.1,
        DebugEvent::SourceFailed { source, .. } if source == "broken"
    )));
    assert!(events.iter().any(|e| matches!(
        &e.1,
        DebugEvent::Selected { source, .. } if source == "fixed"
    )));
}

#[test]
fn test_disabling_blanks_the_display() {
    let sink = RecordingSink::default();
    let mut runtime = Runtime::builder(sink.clone())
        .with_backend(|| NullBackend)
        .with_window_provider(vlc_window)
        .with_config(template_config("%artist - %title"))
        .spawn()
        .unwrap();
    assert_eq!(runtime.refresh().as_deref(), Some("Radiohead - Creep"));

    let mut disabled = template_config("%artist - %title");
    disabled.general.enabled = false;
    runtime.apply_config(disabled).unwrap();

    assert_eq!(sink.texts().last().map(String::as_str), Some(""));
}

#[test]
fn test_host_settings_switch_template() {
    let sink = RecordingSink::default();
    let mut runtime = Runtime::builder(sink)
        .with_backend(|| NullBackend)
        .with_window_provider(vlc_window)
        .spawn()
        .unwrap();

    let settings = serde_json::json!({
        "display_text": "%title",
        "source_name": "Now Playing",
    });
    runtime
        .apply_settings(settings.as_object().unwrap())
        .unwrap();

    assert_eq!(runtime.refresh().as_deref(), Some("Creep"));
}

#[test]
fn test_disabled_source_is_skipped() {
    let sink = RecordingSink::default();
    let mut config = template_config("%artist - %title");
    config.sources.insert("vlc".into(), false);
    let runtime = Runtime::builder(sink)
        .with_backend(|| NullBackend)
        .with_window_provider(vlc_window)
        .with_config(config)
        .spawn()
        .unwrap();

    assert_eq!(runtime.refresh().as_deref(), Some(""));
}

#[test]
fn test_targets_come_from_sink() {
    let runtime = Runtime::builder(RecordingSink::default())
        .with_backend(|| NullBackend)
        .with_window_provider(Vec::new)
        .spawn()
        .unwrap();

    assert_eq!(runtime.targets(TargetKind::Text), vec!["Now Playing"]);
    assert!(runtime.targets(TargetKind::Image).is_empty());
}

#[test]
fn test_shutdown_is_idempotent() {
    let mut runtime = Runtime::builder(RecordingSink::default())
        .with_backend(|| NullBackend)
        .with_window_provider(Vec::new)
        .spawn()
        .unwrap();

    runtime.shutdown();
    runtime.shutdown();
    assert_eq!(runtime.refresh(), None);
}

#[test]
fn test_album_art_refetched_on_metadata_events_only() {
    let sessions = FakeSessions::playing("Roygbiv", true);
    let sink = RecordingSink::default();
    let runtime = spawn_native(&sessions, &sink);

    assert_eq!(
        runtime.refresh().as_deref(),
        Some("Boards of Canada - Roygbiv")
    );
    assert_eq!(sessions.state().art_fetches, 1);
    assert!(matches!(sink.images().as_slice(), [Some(_)]));

    let seen = sessions.state().snapshots;
    sessions.fire(SessionEventKind::TimelineChanged);
    sessions.fire(SessionEventKind::PlaybackInfoChanged);
    wait_until("timeline and playback events", || {
        sessions.state().snapshots >= seen + 2
    });

    sessions.state().title = "Dayvan Cowboy";
    sessions.fire(SessionEventKind::MediaPropertiesChanged);
    wait_until("new track", || {
        sink.texts()
            .contains(&"Boards of Canada - Dayvan Cowboy".to_string())
    });
    // Events are handled in order, so the timeline and playback ones fetched nothing.
    assert_eq!(sessions.state().art_fetches, 2);
    assert_eq!(sink.images().len(), 2);

    sessions.switch_to(2);
    wait_until("session switch", || sessions.state().art_fetches == 3);
    wait_until("art of the new session", || sink.images().len() == 3);
    assert!(sink.images().iter().all(Option::is_some));
}

#[test]
fn test_missing_album_art_clears_image() {
    let sessions = FakeSessions::playing("Roygbiv", true);
    let sink = RecordingSink::default();
    let runtime = spawn_native(&sessions, &sink);
    assert!(runtime.refresh().is_some());
    assert!(matches!(sink.images().last(), Some(Some(_))));

    sessions.state().art = false;
    sessions.fire(SessionEventKind::MediaPropertiesChanged);
    wait_until("image cleared", || matches!(sink.images().last(), Some(None)));

    assert_eq!(sessions.state().art_fetches, 1);
    assert!(runtime.events().iter().any(|e| matches!(
        &e.1,
        DebugEvent::ThumbnailUpdated { path: None }
    )));
}

#[test]
fn test_events_of_replaced_session_are_ignored() {
    let sessions = FakeSessions::playing("Roygbiv", false);
    let sink = RecordingSink::default();
    let runtime = spawn_native(&sessions, &sink);
    assert!(runtime.refresh().is_some());

    let (old_generation, old_tx) = sessions.state().watcher.clone().unwrap();
    let seen = sessions.state().snapshots;
    sessions.switch_to(2);
    wait_until("session switch", || sessions.state().snapshots > seen);
    assert_ne!(sessions.generation(), Some(old_generation));

    let rendered = sink.texts().len();
    let seen = sessions.state().snapshots;
    old_tx
        .send(SessionEvent {
            generation: old_generation,
            kind: SessionEventKind::MediaPropertiesChanged,
        })
        .unwrap();

    // A live event queued behind the stale one marks it as handled.
    sessions.fire(SessionEventKind::TimelineChanged);
    wait_until("live event", || sessions.state().snapshots > seen);
    std::thread::sleep(Duration::from_millis(100));

    assert_eq!(sessions.state().snapshots, seen + 1);
    assert_eq!(sink.texts().len(), rendered);
}

#[test]
fn test_failed_connect_is_retried() {
    let sessions = FakeSessions::playing("Roygbiv", false);
    sessions.state().connect_failures = 2;
    let sink = RecordingSink::default();
    let runtime = spawn_native(&sessions, &sink);

    wait_until("native session", || {
        runtime
            .events()
            .iter()
            .any(|e| matches!(e.1, DebugEvent::SessionReplaced { has_session: true, .. }))
    });

    let failures = runtime
        .events()
        .iter()
        .filter(|e| matches!(e.1, DebugEvent::NativeInitFailed { .. }))
        .count();
    assert_eq!(failures, 2);
    assert_eq!(sessions.state().connects, 3);
    assert_eq!(
        runtime.refresh().as_deref(),
        Some("Boards of Canada - Roygbiv")
    );
}
