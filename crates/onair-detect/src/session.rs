//! Native "now playing" session client.
//!
//! The OS facilities (Windows SMTC, Linux MPRIS) sit behind [`SessionBackend`].
//! [`SessionClient`] owns the active session and its subscriptions and turns
//! OS callbacks into [`SessionEvent`] messages tagged with a session generation,
//! so events from a replaced session can be recognized and dropped.

use std::future::Future;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::DetectError;
use crate::record::{MediaRecord, ThumbnailRef};

/// Source id stamped on records produced by a native backend.
pub const NATIVE_SOURCE_ID: &str = "native";

/// Generation carried by session-manager events (not tied to one session).
pub const MANAGER_GENERATION: u64 = 0;

/// What changed in the OS media state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEventKind {
    /// The active session was replaced, or went away.
    SessionChanged,
    MediaPropertiesChanged,
    TimelineChanged,
    PlaybackInfoChanged,
}

impl SessionEventKind {
    /// Whether the album art may have changed.
    pub fn refetch_thumbnail(&self) -> bool {
        matches!(
            self,
            SessionEventKind::SessionChanged | SessionEventKind::MediaPropertiesChanged
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEvent {
    pub generation: u64,
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn manager(kind: SessionEventKind) -> Self {
        Self {
            generation: MANAGER_GENERATION,
            kind,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// OS media-session facility.
///
/// All methods are called from a single cooperative loop; futures need not be `Send`.
pub trait SessionBackend {
    type Session: Clone + Send + 'static;
    /// Registration handle for one session's callbacks.
    type Watch;
    /// Registration handle for the session-manager callbacks.
    type ManagerWatch;

    /// Acquire the session manager (or bus connection).
    fn connect(&mut self) -> impl Future<Output = Result<(), DetectError>>;

    /// The session the OS currently considers active.
    fn current_session(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Session>, DetectError>>;

    /// Read metadata, timeline and playback state of `session`.
    fn snapshot(
        &self,
        session: &Self::Session,
    ) -> impl Future<Output = Result<Option<MediaRecord>, DetectError>>;

    fn fetch_thumbnail(
        &self,
        thumbnail: &ThumbnailRef,
    ) -> impl Future<Output = Result<Vec<u8>, DetectError>>;

    fn watch_manager(&mut self, events: EventSender) -> Result<Self::ManagerWatch, DetectError>;

    fn unwatch_manager(&mut self, watch: Self::ManagerWatch);

    /// Register callbacks on `session`; every event sent must carry `generation`.
    fn watch_session(
        &mut self,
        session: &Self::Session,
        generation: u64,
        events: EventSender,
    ) -> Result<Self::Watch, DetectError>;

    /// Deregister `watch`. No callback of that registration may fire afterwards.
    fn unwatch_session(&mut self, session: &Self::Session, watch: Self::Watch);

    /// Release the session manager.
    fn disconnect(&mut self);
}

/// Lifecycle of a [`SessionClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Uninitialized,
    Initializing,
    Subscribed,
    SessionReplacing,
    TornDown,
}

struct ActiveSession<B: SessionBackend> {
    session: B::Session,
    watch: B::Watch,
}

pub struct SessionClient<B: SessionBackend> {
    backend: B,
    state: ClientState,
    generation: u64,
    events: Option<EventSender>,
    manager_watch: Option<B::ManagerWatch>,
    active: Option<ActiveSession<B>>,
}

impl<B: SessionBackend> SessionClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: ClientState::Uninitialized,
            generation: MANAGER_GENERATION,
            events: None,
            manager_watch: None,
            active: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Generation of the currently watched session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn has_session(&self) -> bool {
        self.active.is_some()
    }

    /// Whether `event` still refers to the live session.
    pub fn is_current(&self, event: &SessionEvent) -> bool {
        if self.state == ClientState::TornDown {
            return false;
        }
        event.generation == MANAGER_GENERATION || event.generation == self.generation
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Connect to the OS session manager.
    ///
    /// On failure the client falls back to `Uninitialized` and can be retried.
    pub async fn initialize(&mut self) -> Result<(), DetectError> {
        match self.state {
            ClientState::Uninitialized => {}
            ClientState::TornDown => return Err(DetectError::NotConnected),
            _ => return Ok(()),
        }

        self.state = ClientState::Initializing;
        match self.backend.connect().await {
            Ok(()) => {
                info!("Native session manager connected");
                Ok(())
            }
            Err(e) => {
                self.state = ClientState::Uninitialized;
                error!("Failed to initialize native session manager: {e}");
                Err(e)
            }
        }
    }

    /// Register for manager events and attach to the current session.
    pub async fn subscribe(&mut self, events: EventSender) -> Result<(), DetectError> {
        match self.state {
            ClientState::Initializing => {}
            ClientState::Subscribed | ClientState::SessionReplacing => return Ok(()),
            ClientState::Uninitialized | ClientState::TornDown => {
                return Err(DetectError::NotConnected)
            }
        }

        let watch = match self.backend.watch_manager(events.clone()) {
            Ok(watch) => watch,
            Err(e) => {
                error!("Failed to subscribe to session manager: {e}");
                self.backend.disconnect();
                self.state = ClientState::Uninitialized;
                return Err(e);
            }
        };
        self.manager_watch = Some(watch);
        self.events = Some(events);
        self.state = ClientState::Subscribed;

        self.refresh_session().await?;
        Ok(())
    }

    /// Re-query the active session and switch to it.
    pub async fn refresh_session(&mut self) -> Result<u64, DetectError> {
        let session = match self.backend.current_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!("Failed to query current media session: {e}");
                None
            }
        };
        self.set_session(session)
    }

    /// Replace the watched session.
    ///
    /// The old session's callbacks are removed before the new session's are
    /// registered, and the generation is bumped so queued events of the old
    /// session become stale. Returns the new generation.
    pub fn set_session(&mut self, session: Option<B::Session>) -> Result<u64, DetectError> {
        if !matches!(
            self.state,
            ClientState::Subscribed | ClientState::SessionReplacing
        ) {
            return Err(DetectError::NotConnected);
        }
        let Some(events) = self.events.clone() else {
            return Err(DetectError::NotConnected);
        };

        self.state = ClientState::SessionReplacing;
        if let Some(old) = self.active.take() {
            self.backend.unwatch_session(&old.session, old.watch);
        }
        self.generation += 1;

        if let Some(session) = session {
            match self.backend.watch_session(&session, self.generation, events) {
                Ok(watch) => self.active = Some(ActiveSession { session, watch }),
                Err(e) => warn!("Failed to subscribe to media session: {e}"),
            }
        }
        self.state = ClientState::Subscribed;

        debug!(
            generation = self.generation,
            active = self.active.is_some(),
            "Media session replaced"
        );
        Ok(self.generation)
    }

    /// Read the active session. "Not ready" and backend failures yield `None`.
    pub async fn capture_snapshot(&self) -> Option<MediaRecord> {
        let active = self.active.as_ref()?;

        let started = Instant::now();
        let result = self.backend.snapshot(&active.session).await;
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Native snapshot captured"
        );

        match result {
            Ok(record) => record,
            Err(DetectError::NotReady) => {
                info!("Media session not ready yet");
                None
            }
            Err(e) => {
                warn!("Failed to read media session: {e}");
                None
            }
        }
    }

    pub async fn fetch_thumbnail(&self, thumbnail: &ThumbnailRef) -> Result<Vec<u8>, DetectError> {
        self.backend.fetch_thumbnail(thumbnail).await
    }

    /// Remove every subscription and release the manager. Idempotent and terminal.
    pub fn teardown(&mut self) {
        if self.state == ClientState::TornDown {
            return;
        }
        let connected = self.state != ClientState::Uninitialized;

        if let Some(old) = self.active.take() {
            self.backend.unwatch_session(&old.session, old.watch);
        }
        if let Some(watch) = self.manager_watch.take() {
            self.backend.unwatch_manager(watch);
        }
        if connected {
            self.backend.disconnect();
        }
        self.events = None;
        self.generation += 1;
        self.state = ClientState::TornDown;
        debug!("Native session client torn down");
    }
}

impl<B: SessionBackend> Drop for SessionClient<B> {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Backend for hosts without a native media-session facility.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBackend;

impl SessionBackend for NullBackend {
    type Session = ();
    type Watch = ();
    type ManagerWatch = ();

    async fn connect(&mut self) -> Result<(), DetectError> {
        Err(DetectError::Unsupported)
    }

    async fn current_session(&mut self) -> Result<Option<()>, DetectError> {
        Ok(None)
    }

    async fn snapshot(&self, _session: &()) -> Result<Option<MediaRecord>, DetectError> {
        Ok(None)
    }

    async fn fetch_thumbnail(&self, thumbnail: &ThumbnailRef) -> Result<Vec<u8>, DetectError> {
        Err(DetectError::UnsupportedThumbnail(thumbnail.describe()))
    }

    fn watch_manager(&mut self, _events: EventSender) -> Result<(), DetectError> {
        Err(DetectError::Unsupported)
    }

    fn unwatch_manager(&mut self, _watch: ()) {}

    fn watch_session(
        &mut self,
        _session: &(),
        _generation: u64,
        _events: EventSender,
    ) -> Result<(), DetectError> {
        Err(DetectError::Unsupported)
    }

    fn unwatch_session(&mut self, _session: &(), _watch: ()) {}

    fn disconnect(&mut self) {}
}
