use chrono::{DateTime, Utc};
use onair_detect::{MediaRecord, Timeline};

use super::value::Value;
use crate::error::RenderError;

/// Names an expression may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Name {
    Data,
    NoData,
    Source,
    Artist,
    Title,
    Subtitle,
    AlbumTitle,
    AlbumArtist,
    AlbumTrackCount,
    TrackNumber,
    Genres,
    Thumbnail,
    Position,
    StartTime,
    EndTime,
    MinSeekTime,
    MaxSeekTime,
    LastUpdatedTime,
    PlaybackStatus,
    PlaybackRate,
    PlaybackType,
    RepeatMode,
    IsShuffleActive,
}

impl Name {
    pub fn resolve(ident: &str) -> Option<Self> {
        let name = match ident {
            "data" => Name::Data,
            "nodata" => Name::NoData,
            "source" => Name::Source,
            "artist" => Name::Artist,
            "title" => Name::Title,
            "subtitle" => Name::Subtitle,
            "album_title" => Name::AlbumTitle,
            "album_artist" => Name::AlbumArtist,
            "album_track_count" => Name::AlbumTrackCount,
            "track_number" => Name::TrackNumber,
            "genres" => Name::Genres,
            "thumbnail" => Name::Thumbnail,
            "position" => Name::Position,
            "start_time" => Name::StartTime,
            "end_time" => Name::EndTime,
            "min_seek_time" => Name::MinSeekTime,
            "max_seek_time" => Name::MaxSeekTime,
            "last_updated_time" => Name::LastUpdatedTime,
            "playback_status" => Name::PlaybackStatus,
            "playback_rate" => Name::PlaybackRate,
            "playback_type" => Name::PlaybackType,
            "repeat_mode" => Name::RepeatMode,
            "is_shuffle_active" => Name::IsShuffleActive,
            _ => return None,
        };
        Some(name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Name::Data => "data",
            Name::NoData => "nodata",
            Name::Source => "source",
            Name::Artist => "artist",
            Name::Title => "title",
            Name::Subtitle => "subtitle",
            Name::AlbumTitle => "album_title",
            Name::AlbumArtist => "album_artist",
            Name::AlbumTrackCount => "album_track_count",
            Name::TrackNumber => "track_number",
            Name::Genres => "genres",
            Name::Thumbnail => "thumbnail",
            Name::Position => "position",
            Name::StartTime => "start_time",
            Name::EndTime => "end_time",
            Name::MinSeekTime => "min_seek_time",
            Name::MaxSeekTime => "max_seek_time",
            Name::LastUpdatedTime => "last_updated_time",
            Name::PlaybackStatus => "playback_status",
            Name::PlaybackRate => "playback_rate",
            Name::PlaybackType => "playback_type",
            Name::RepeatMode => "repeat_mode",
            Name::IsShuffleActive => "is_shuffle_active",
        }
    }
}

/// Everything an expression can see during one render.
pub struct RenderContext<'a> {
    record: Option<&'a MediaRecord>,
    now: DateTime<Utc>,
}

impl<'a> RenderContext<'a> {
    pub fn new(record: Option<&'a MediaRecord>, now: DateTime<Utc>) -> Self {
        Self { record, now }
    }

    fn record(&self, name: Name) -> Result<&'a MediaRecord, RenderError> {
        self.record.ok_or(RenderError::Missing(name.as_str()))
    }

    fn timeline(&self, name: Name) -> Result<&'a Timeline, RenderError> {
        self.record(name)?
            .timeline
            .as_ref()
            .ok_or(RenderError::Missing(name.as_str()))
    }

    pub fn lookup(&self, name: Name) -> Result<Value, RenderError> {
        let value = match name {
            Name::Data => Value::Bool(self.record.is_some()),
            Name::NoData => Value::Bool(self.record.is_none()),
            Name::Source => Value::Str(self.record(name)?.source.clone()),
            Name::Artist => Value::Str(self.record(name)?.artist.clone()),
            Name::Title => Value::Str(self.record(name)?.title.clone()),
            Name::Subtitle => Value::opt_str(&self.record(name)?.subtitle),
            Name::AlbumTitle => Value::opt_str(&self.record(name)?.album_title),
            Name::AlbumArtist => Value::opt_str(&self.record(name)?.album_artist),
            Name::AlbumTrackCount => Value::opt_int(self.record(name)?.album_track_count),
            Name::TrackNumber => Value::opt_int(self.record(name)?.track_number),
            Name::Genres => Value::List(
                self.record(name)?
                    .genres
                    .iter()
                    .map(|g| Value::Str(g.clone()))
                    .collect(),
            ),
            Name::Thumbnail => match &self.record(name)?.thumbnail {
                Some(thumbnail) => Value::Str(thumbnail.describe()),
                None => Value::None,
            },
            Name::Position => Value::Duration(self.timeline(name)?.position),
            Name::StartTime => Value::Duration(self.timeline(name)?.start_time),
            Name::EndTime => Value::Duration(self.timeline(name)?.end_time),
            Name::MinSeekTime => Value::Duration(self.timeline(name)?.min_seek_time),
            Name::MaxSeekTime => Value::Duration(self.timeline(name)?.max_seek_time),
            Name::LastUpdatedTime => Value::Time(self.timeline(name)?.last_updated_time),
            Name::PlaybackStatus => {
                Value::Str(self.timeline(name)?.playback_status.as_str().to_string())
            }
            Name::PlaybackRate => Value::Float(self.timeline(name)?.playback_rate),
            Name::PlaybackType => Value::opt_str(&self.timeline(name)?.playback_type),
            Name::RepeatMode => match self.timeline(name)?.repeat_mode {
                Some(mode) => Value::Str(mode.as_str().to_string()),
                None => Value::None,
            },
            Name::IsShuffleActive => match self.timeline(name)?.is_shuffle_active {
                Some(active) => Value::Bool(active),
                None => Value::None,
            },
        };
        Ok(value)
    }

    /// `posavail()`: false without a record, a timeline, or a real update time.
    pub fn position_available(&self) -> bool {
        self.record.is_some_and(MediaRecord::position_available)
    }

    /// `predictedpos()`: live position extrapolated to now.
    pub fn predicted_position(&self) -> Result<Value, RenderError> {
        let timeline = self
            .record
            .and_then(|r| r.timeline.as_ref())
            .ok_or(RenderError::Missing("predictedpos"))?;
        Ok(Value::Duration(timeline.predicted_position(self.now)))
    }
}
