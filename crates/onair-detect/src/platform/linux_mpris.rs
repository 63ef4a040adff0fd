use std::collections::HashMap;
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Utc;
use mpris::{LoopStatus, Player, PlayerFinder};
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::DetectError;
use crate::platform::select_mpris_bus;
use crate::record::{self, MediaRecord, PlaybackStatus, RepeatMode, ThumbnailRef, Timeline};
use crate::session::{
    EventSender, SessionBackend, SessionEvent, SessionEventKind, NATIVE_SOURCE_ID,
};
use crate::thumbnail;

/// How often the bus is rescanned for a change of preferred player.
const BUS_POLL_INTERVAL: StdDuration = StdDuration::from_secs(2);

/// How often a watched player is read for changes.
const PLAYER_POLL_INTERVAL: StdDuration = StdDuration::from_millis(500);

/// Position drift beyond this between two polls counts as a seek.
const SEEK_TOLERANCE: StdDuration = StdDuration::from_millis(1500);

/// An MPRIS player, identified by its well-known bus name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MprisSession {
    pub bus_name: String,
}

/// Sender shared with a watcher thread. Taking it out stops delivery.
type SharedSender = Arc<Mutex<Option<EventSender>>>;

pub struct MprisWatch(SharedSender);

impl MprisWatch {
    fn new(events: EventSender) -> Self {
        Self(Arc::new(Mutex::new(Some(events))))
    }

    fn release(self) {
        if let Ok(mut sender) = self.0.lock() {
            sender.take();
        }
    }
}

fn is_released(sender: &SharedSender) -> bool {
    sender.lock().map(|s| s.is_none()).unwrap_or(true)
}

/// Send `event` unless the watch was released. Returns `false` once released.
fn deliver(sender: &SharedSender, event: SessionEvent) -> bool {
    match sender.lock() {
        Ok(guard) => match guard.as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        },
        Err(_) => false,
    }
}

/// D-Bus state owned by the connection thread.
struct Bus {
    finder: PlayerFinder,
    players: HashMap<String, Player>,
}

impl Bus {
    /// Bus names of all MPRIS players. Lookup failures yield an empty list.
    fn bus_names(&mut self) -> Vec<String> {
        match self.finder.find_all() {
            Ok(players) => players
                .iter()
                .map(|player| player.bus_name().to_string())
                .collect(),
            Err(e) => {
                debug!("No MPRIS players found: {e}");
                vec![]
            }
        }
    }

    /// The player on `bus_name`, if it is still running.
    fn player(&mut self, bus_name: &str) -> Option<&Player> {
        let running = self.players.get(bus_name).map(Player::is_running);
        match running {
            Some(true) => {}
            Some(false) => {
                self.players.remove(bus_name);
                return None;
            }
            None => {
                let player = self
                    .finder
                    .find_all()
                    .ok()?
                    .into_iter()
                    .find(|player| player.bus_name().to_string() == bus_name)?;
                self.players.insert(bus_name.to_string(), player);
            }
        }
        self.players.get(bus_name)
    }

    fn snapshot(&mut self, bus_name: &str) -> Result<Option<MediaRecord>, DetectError> {
        match self.player(bus_name) {
            Some(player) => read_player(player).map(Some),
            None => {
                debug!(bus = %bus_name, "MPRIS player went away");
                Ok(None)
            }
        }
    }

    fn player_state(&mut self, bus_name: &str) -> Option<PlayerState> {
        self.player(bus_name).map(PlayerState::read)
    }
}

type Job = Box<dyn FnOnce(&mut Bus) + Send>;

/// Handle to the thread that owns the D-Bus connection.
///
/// The thread exits once every handle is dropped.
#[derive(Clone)]
struct BusHandle(std_mpsc::Sender<Job>);

impl BusHandle {
    /// Open the session bus on a new thread. Blocks until it is open.
    fn start() -> Result<Self, DetectError> {
        let (jobs, queue) = std_mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        thread::Builder::new()
            .name("mpris-bus".into())
            .spawn(move || {
                let finder = match PlayerFinder::new() {
                    Ok(finder) => finder,
                    Err(e) => {
                        let message = format!("failed to connect to D-Bus: {e}");
                        let _ = ready_tx.send(Err(DetectError::Backend(message)));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));

                let mut bus = Bus {
                    finder,
                    players: HashMap::new(),
                };
                for job in queue {
                    job(&mut bus);
                }
                debug!("D-Bus connection closed");
            })?;

        ready_rx.recv().map_err(|_| DetectError::NotConnected)??;
        Ok(Self(jobs))
    }

    fn submit<T, F>(&self, job: F) -> oneshot::Receiver<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Bus) -> T + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        // A closed queue drops `tx`, which the receiver reports.
        let _ = self.0.send(Box::new(move |bus: &mut Bus| {
            let _ = tx.send(job(bus));
        }));
        rx
    }

    async fn call<T, F>(&self, job: F) -> Result<T, DetectError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Bus) -> T + Send + 'static,
    {
        self.submit(job)
            .await
            .map_err(|_| DetectError::NotConnected)
    }

    /// Run `job` from a plain thread. `None` once the connection is gone.
    fn call_blocking<T, F>(&self, job: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Bus) -> T + Send + 'static,
    {
        self.submit(job).blocking_recv().ok()
    }
}

/// What a player poll compares.
#[derive(Debug, Clone, PartialEq, Default)]
struct PlayerState {
    title: String,
    artists: Vec<String>,
    album: Option<String>,
    art_url: Option<String>,
    length: Option<StdDuration>,
    status: PlaybackStatus,
    rate: f64,
    repeat: Option<RepeatMode>,
    shuffle: Option<bool>,
    position: Option<StdDuration>,
}

impl PlayerState {
    fn read(player: &Player) -> Self {
        let mut state = Self {
            status: playback_status(player),
            rate: player.get_playback_rate().unwrap_or(1.0),
            repeat: player.get_loop_status().ok().map(repeat_mode),
            shuffle: player.get_shuffle().ok(),
            position: player.get_position().ok(),
            ..Default::default()
        };
        if let Ok(metadata) = player.get_metadata() {
            state.title = metadata.title().unwrap_or_default().to_string();
            state.artists = metadata
                .artists()
                .map(|artists| artists.iter().map(|a| a.to_string()).collect())
                .unwrap_or_default();
            state.album = metadata.album_name().map(str::to_string);
            state.art_url = metadata.art_url().map(str::to_string);
            state.length = metadata.length();
        }
        state
    }

    fn same_track(&self, other: &PlayerState) -> bool {
        (&self.title, &self.artists, &self.album, &self.art_url, self.length)
            == (&other.title, &other.artists, &other.album, &other.art_url, other.length)
    }

    fn same_playback(&self, other: &PlayerState) -> bool {
        (self.status, self.rate, self.repeat, self.shuffle)
            == (other.status, other.rate, other.repeat, other.shuffle)
    }

    /// Events implied by moving from `prev` to `self` in `elapsed`.
    fn changes_since(&self, prev: &PlayerState, elapsed: StdDuration) -> Vec<SessionEventKind> {
        let mut kinds = Vec::new();
        if !self.same_track(prev) {
            kinds.push(SessionEventKind::MediaPropertiesChanged);
        }
        if !self.same_playback(prev) {
            kinds.push(SessionEventKind::PlaybackInfoChanged);
        }
        if self.same_track(prev) && self.seeked_since(prev, elapsed) {
            kinds.push(SessionEventKind::TimelineChanged);
        }
        kinds
    }

    fn seeked_since(&self, prev: &PlayerState, elapsed: StdDuration) -> bool {
        let (Some(before), Some(now)) = (prev.position, self.position) else {
            return false;
        };
        let expected = match prev.status {
            PlaybackStatus::Playing if prev.rate.is_finite() && prev.rate > 0.0 => {
                before + elapsed.mul_f64(prev.rate)
            }
            _ => before,
        };
        let drift = if now > expected {
            now - expected
        } else {
            expected - now
        };
        drift > SEEK_TOLERANCE
    }
}

fn playback_status(player: &Player) -> PlaybackStatus {
    match player.get_playback_status() {
        Ok(mpris::PlaybackStatus::Playing) => PlaybackStatus::Playing,
        Ok(mpris::PlaybackStatus::Paused) => PlaybackStatus::Paused,
        Ok(mpris::PlaybackStatus::Stopped) => PlaybackStatus::Stopped,
        Err(_) => PlaybackStatus::Other,
    }
}

fn repeat_mode(status: LoopStatus) -> RepeatMode {
    match status {
        LoopStatus::None => RepeatMode::None,
        LoopStatus::Track => RepeatMode::Track,
        LoopStatus::Playlist => RepeatMode::List,
    }
}

/// Linux MPRIS (D-Bus) backend.
///
/// One connection thread serves every call; watcher threads poll through it.
#[derive(Default)]
pub struct MprisBackend {
    client: reqwest::Client,
    bus: Option<BusHandle>,
}

impl MprisBackend {
    fn bus(&self) -> Result<&BusHandle, DetectError> {
        self.bus.as_ref().ok_or(DetectError::NotConnected)
    }
}

impl SessionBackend for MprisBackend {
    type Session = MprisSession;
    type Watch = MprisWatch;
    type ManagerWatch = MprisWatch;

    async fn connect(&mut self) -> Result<(), DetectError> {
        if self.bus.is_none() {
            self.bus = Some(tokio::task::spawn_blocking(BusHandle::start).await??);
        }
        Ok(())
    }

    async fn current_session(&mut self) -> Result<Option<MprisSession>, DetectError> {
        let names = self.bus()?.call(Bus::bus_names).await?;
        Ok(select_mpris_bus(&names).map(|bus_name| MprisSession {
            bus_name: bus_name.to_string(),
        }))
    }

    async fn snapshot(&self, session: &MprisSession) -> Result<Option<MediaRecord>, DetectError> {
        let bus_name = session.bus_name.clone();
        self.bus()?
            .call(move |bus| bus.snapshot(&bus_name))
            .await?
    }

    async fn fetch_thumbnail(&self, thumbnail: &ThumbnailRef) -> Result<Vec<u8>, DetectError> {
        match thumbnail {
            ThumbnailRef::Url(url) => thumbnail::fetch_url(&self.client, url).await,
        }
    }

    fn watch_manager(&mut self, events: EventSender) -> Result<MprisWatch, DetectError> {
        let bus = self.bus()?.clone();
        let watch = MprisWatch::new(events);
        let sender = Arc::clone(&watch.0);

        thread::Builder::new()
            .name("mpris-manager".into())
            .spawn(move || {
                let preferred = |names: Vec<String>| select_mpris_bus(&names).map(str::to_string);
                let Some(mut selected) = bus.call_blocking(Bus::bus_names).map(preferred) else {
                    return;
                };
                loop {
                    thread::sleep(BUS_POLL_INTERVAL);
                    if is_released(&sender) {
                        break;
                    }
                    let Some(current) = bus.call_blocking(Bus::bus_names).map(preferred) else {
                        break;
                    };
                    if current != selected {
                        debug!(from = ?selected, to = ?current, "Preferred MPRIS player changed");
                        selected = current;
                        let event = SessionEvent::manager(SessionEventKind::SessionChanged);
                        if !deliver(&sender, event) {
                            break;
                        }
                    }
                }
            })?;

        Ok(watch)
    }

    fn unwatch_manager(&mut self, watch: MprisWatch) {
        watch.release();
    }

    fn watch_session(
        &mut self,
        session: &MprisSession,
        generation: u64,
        events: EventSender,
    ) -> Result<MprisWatch, DetectError> {
        let bus = self.bus()?.clone();
        let watch = MprisWatch::new(events);
        let sender = Arc::clone(&watch.0);
        let bus_name = session.bus_name.clone();

        thread::Builder::new()
            .name("mpris-events".into())
            .spawn(move || {
                let read = |bus: &BusHandle| {
                    let bus_name = bus_name.clone();
                    bus.call_blocking(move |bus| bus.player_state(&bus_name))
                };
                let Some(Some(mut last)) = read(&bus) else {
                    return;
                };

                loop {
                    thread::sleep(PLAYER_POLL_INTERVAL);
                    if is_released(&sender) {
                        break;
                    }
                    let state = match read(&bus) {
                        Some(Some(state)) => state,
                        Some(None) => {
                            let kind = SessionEventKind::SessionChanged;
                            deliver(&sender, SessionEvent { generation, kind });
                            break;
                        }
                        None => break,
                    };
                    for kind in state.changes_since(&last, PLAYER_POLL_INTERVAL) {
                        if !deliver(&sender, SessionEvent { generation, kind }) {
                            return;
                        }
                    }
                    last = state;
                }
            })?;

        Ok(watch)
    }

    fn unwatch_session(&mut self, _session: &MprisSession, watch: MprisWatch) {
        watch.release();
    }

    fn disconnect(&mut self) {
        self.bus = None;
    }
}

fn read_player(player: &Player) -> Result<MediaRecord, DetectError> {
    let metadata = player
        .get_metadata()
        .map_err(|e| DetectError::Backend(format!("failed to read MPRIS metadata: {e}")))?;

    let artist = metadata
        .artists()
        .map(|artists| artists.join(", "))
        .unwrap_or_default();
    let title = metadata.title().unwrap_or_default().to_string();

    let mut record = MediaRecord::new(NATIVE_SOURCE_ID, artist, title);
    record.album_title = metadata.album_name().map(str::to_string);
    record.album_artist = metadata.album_artists().map(|artists| artists.join(", "));
    record.track_number = metadata.track_number().and_then(|n| u32::try_from(n).ok());
    record.thumbnail = metadata
        .art_url()
        .filter(|url| !url.is_empty())
        .map(|url| ThumbnailRef::Url(url.to_string()));

    let length = metadata
        .length()
        .map(record::from_std)
        .unwrap_or_else(chrono::Duration::zero);
    let mut timeline = Timeline {
        end_time: length,
        max_seek_time: length,
        playback_status: playback_status(player),
        playback_rate: player.get_playback_rate().unwrap_or(1.0),
        repeat_mode: player.get_loop_status().ok().map(repeat_mode),
        is_shuffle_active: player.get_shuffle().ok(),
        ..Default::default()
    };
    // Without a position the timeline stays at the "unavailable" sentinel.
    if let Ok(position) = player.get_position() {
        timeline.position = record::from_std(position);
        timeline.last_updated_time = Utc::now();
    }
    record.timeline = Some(timeline);

    debug!(player = player.identity(), title = %record.title, "Read MPRIS player");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn playing(title: &str, position_secs: u64) -> PlayerState {
        PlayerState {
            title: title.to_string(),
            artists: vec!["Stereolab".to_string()],
            status: PlaybackStatus::Playing,
            rate: 1.0,
            position: Some(StdDuration::from_secs(position_secs)),
            ..Default::default()
        }
    }

    #[test]
    fn test_steady_playback_is_quiet() {
        let prev = playing("French Disko", 10);
        let next = playing("French Disko", 11);
        assert!(next
            .changes_since(&prev, StdDuration::from_secs(1))
            .is_empty());
    }

    #[test]
    fn test_track_change() {
        let prev = playing("French Disko", 200);
        let next = playing("Ping Pong", 0);
        assert_eq!(
            next.changes_since(&prev, PLAYER_POLL_INTERVAL),
            vec![SessionEventKind::MediaPropertiesChanged]
        );
    }

    #[test]
    fn test_pause_and_shuffle_are_playback_info() {
        let prev = playing("French Disko", 10);
        let mut next = prev.clone();
        next.status = PlaybackStatus::Paused;
        assert_eq!(
            next.changes_since(&prev, StdDuration::ZERO),
            vec![SessionEventKind::PlaybackInfoChanged]
        );

        let mut next = prev.clone();
        next.shuffle = Some(true);
        assert_eq!(
            next.changes_since(&prev, StdDuration::ZERO),
            vec![SessionEventKind::PlaybackInfoChanged]
        );
    }

    #[test]
    fn test_seek_detected_from_position_jump() {
        let prev = playing("French Disko", 10);
        let next = playing("French Disko", 95);
        assert_eq!(
            next.changes_since(&prev, StdDuration::from_secs(1)),
            vec![SessionEventKind::TimelineChanged]
        );

        let mut paused = prev.clone();
        paused.status = PlaybackStatus::Paused;
        let mut still = paused.clone();
        still.position = Some(StdDuration::from_secs(10));
        assert!(still
            .changes_since(&paused, StdDuration::from_secs(5))
            .is_empty());
    }

    #[test]
    fn test_released_watch_stops_delivery() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let watch = MprisWatch::new(tx);
        let sender = Arc::clone(&watch.0);
        let event = SessionEvent {
            generation: 3,
            kind: SessionEventKind::TimelineChanged,
        };

        assert!(!is_released(&sender));
        assert!(deliver(&sender, event));
        assert_eq!(rx.try_recv().unwrap(), event);

        watch.release();
        assert!(is_released(&sender));
        assert!(!deliver(&sender, event));
        assert!(rx.try_recv().is_err());
    }
}
