use chrono::{DateTime, Duration, Utc};

/// Seconds between 1601-01-01 (the Windows FILETIME epoch) and the Unix epoch.
const FILETIME_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Playback state of the active session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
    #[default]
    Other,
}

impl PlaybackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
            PlaybackStatus::Other => "Other",
        }
    }
}

/// Repeat mode reported by the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepeatMode {
    #[default]
    None,
    Track,
    List,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::None => "None",
            RepeatMode::Track => "Track",
            RepeatMode::List => "List",
        }
    }
}

/// Where the album art of a record can be read from.
#[derive(Debug, Clone)]
pub enum ThumbnailRef {
    /// `file://` or `http(s)://` URL (MPRIS `mpris:artUrl`).
    Url(String),
    /// In-process stream handed out by the Windows session manager.
    #[cfg(target_os = "windows")]
    Stream(windows::Storage::Streams::IRandomAccessStreamReference),
}

impl ThumbnailRef {
    /// Short description used in logs and in the render context.
    pub fn describe(&self) -> String {
        match self {
            ThumbnailRef::Url(url) => url.clone(),
            #[cfg(target_os = "windows")]
            ThumbnailRef::Stream(_) => "<stream>".to_string(),
        }
    }
}

impl PartialEq for ThumbnailRef {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ThumbnailRef::Url(a), ThumbnailRef::Url(b)) => a == b,
            #[cfg(target_os = "windows")]
            (ThumbnailRef::Stream(a), ThumbnailRef::Stream(b)) => a == b,
            #[cfg(target_os = "windows")]
            _ => false,
        }
    }
}

/// Position and playback state of the active media.
#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub position: Duration,
    pub start_time: Duration,
    pub end_time: Duration,
    pub min_seek_time: Duration,
    pub max_seek_time: Duration,
    /// When `position` was sampled. The FILETIME epoch means "unknown".
    pub last_updated_time: DateTime<Utc>,
    pub playback_status: PlaybackStatus,
    pub playback_rate: f64,
    pub playback_type: Option<String>,
    pub repeat_mode: Option<RepeatMode>,
    pub is_shuffle_active: Option<bool>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self {
            position: Duration::zero(),
            start_time: Duration::zero(),
            end_time: Duration::zero(),
            min_seek_time: Duration::zero(),
            max_seek_time: Duration::zero(),
            last_updated_time: Timeline::sentinel(),
            playback_status: PlaybackStatus::Other,
            playback_rate: 1.0,
            playback_type: None,
            repeat_mode: None,
            is_shuffle_active: None,
        }
    }
}

impl Timeline {
    /// The "never updated" timestamp (1601-01-01T00:00:00Z).
    pub fn sentinel() -> DateTime<Utc> {
        DateTime::from_timestamp(-FILETIME_EPOCH_OFFSET_SECS, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Convert a Windows `DateTime::UniversalTime` (100ns ticks since 1601).
    pub fn from_filetime_ticks(ticks: i64) -> DateTime<Utc> {
        let secs = ticks.div_euclid(10_000_000) - FILETIME_EPOCH_OFFSET_SECS;
        let nanos = (ticks.rem_euclid(10_000_000) * 100) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_else(Timeline::sentinel)
    }

    /// Whether the timeline fields carry real data.
    pub fn is_available(&self) -> bool {
        self.last_updated_time > Timeline::sentinel()
    }

    /// Extrapolate `position` to `now`.
    ///
    /// Only a playing session moves; otherwise the last known position is
    /// returned unchanged.
    pub fn predicted_position(&self, now: DateTime<Utc>) -> Duration {
        if self.playback_status != PlaybackStatus::Playing || !self.is_available() {
            return self.position;
        }
        let elapsed = now - self.last_updated_time;
        let elapsed_us = elapsed.num_microseconds().unwrap_or(i64::MAX) as f64;
        self.position + Duration::microseconds((elapsed_us * self.playback_rate) as i64)
    }
}

/// Canonical "now playing" snapshot.
///
/// Records are never mutated after capture; a new capture produces a new record.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaRecord {
    /// Id of the capture source that produced this record.
    pub source: String,
    pub artist: String,
    pub title: String,
    pub subtitle: Option<String>,
    pub album_title: Option<String>,
    pub album_artist: Option<String>,
    pub album_track_count: Option<u32>,
    pub track_number: Option<u32>,
    pub genres: Vec<String>,
    pub thumbnail: Option<ThumbnailRef>,
    pub timeline: Option<Timeline>,
}

impl MediaRecord {
    pub fn new(
        source: impl Into<String>,
        artist: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            artist: artist.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    /// A record with neither artist nor title is "nothing playing".
    pub fn is_empty(&self) -> bool {
        self.artist.is_empty() && self.title.is_empty()
    }

    pub fn position_available(&self) -> bool {
        self.timeline.as_ref().is_some_and(Timeline::is_available)
    }
}

/// Convert a non-negative `std` duration, saturating on overflow.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn from_std(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::MAX)
}
