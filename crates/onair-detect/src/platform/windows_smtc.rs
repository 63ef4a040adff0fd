use chrono::Duration;
use tracing::{debug, warn};
use windows::core::RuntimeType;
use windows::Foundation::{TimeSpan, TypedEventHandler};
use windows::Media::Control::{
    GlobalSystemMediaTransportControlsSession as Session,
    GlobalSystemMediaTransportControlsSessionManager as Manager,
    GlobalSystemMediaTransportControlsSessionPlaybackStatus as SmtcStatus,
};
use windows::Media::{MediaPlaybackAutoRepeatMode, MediaPlaybackType};
use windows::Storage::Streams::{DataReader, IRandomAccessStreamReference, InputStreamOptions};

use crate::error::DetectError;
use crate::record::{MediaRecord, PlaybackStatus, RepeatMode, ThumbnailRef, Timeline};
use crate::session::{
    EventSender, SessionBackend, SessionEvent, SessionEventKind, NATIVE_SOURCE_ID,
};
use crate::thumbnail::{self, CHUNK_SIZE};

/// Removes one event registration when called.
type Unregister = Box<dyn FnOnce() + Send>;

/// Event registrations made on the manager or on one session.
pub struct Registrations(Vec<Unregister>);

impl Registrations {
    fn release(self) {
        for unregister in self.0 {
            unregister();
        }
    }
}

/// Windows System Media Transport Controls backend.
#[derive(Default)]
pub struct SmtcBackend {
    manager: Option<Manager>,
    client: reqwest::Client,
}

impl SmtcBackend {
    fn manager(&self) -> Result<&Manager, DetectError> {
        self.manager.as_ref().ok_or(DetectError::NotConnected)
    }
}

impl SessionBackend for SmtcBackend {
    type Session = Session;
    type Watch = Registrations;
    type ManagerWatch = Registrations;

    async fn connect(&mut self) -> Result<(), DetectError> {
        let manager =
            tokio::task::spawn_blocking(|| Manager::RequestAsync()?.get()).await??;
        self.manager = Some(manager);
        Ok(())
    }

    async fn current_session(&mut self) -> Result<Option<Session>, DetectError> {
        // A null current session surfaces as an error from the projection.
        let session = self.manager()?.GetCurrentSession().ok();
        if let Some(session) = &session {
            let app = session.SourceAppUserModelId().map(|id| id.to_string());
            debug!(app = ?app, "Current SMTC session");
        }
        Ok(session)
    }

    async fn snapshot(&self, session: &Session) -> Result<Option<MediaRecord>, DetectError> {
        let session = session.clone();
        let record = tokio::task::spawn_blocking(move || read_session(&session)).await??;
        Ok(Some(record))
    }

    async fn fetch_thumbnail(&self, thumbnail: &ThumbnailRef) -> Result<Vec<u8>, DetectError> {
        match thumbnail {
            ThumbnailRef::Url(url) => thumbnail::fetch_url(&self.client, url).await,
            ThumbnailRef::Stream(stream) => {
                let stream = stream.clone();
                Ok(tokio::task::spawn_blocking(move || read_stream(&stream)).await??)
            }
        }
    }

    fn watch_manager(&mut self, events: EventSender) -> Result<Registrations, DetectError> {
        let manager = self.manager()?.clone();
        let tx = events;
        let handler = TypedEventHandler::new(move |_, _| {
            let _ = tx.send(SessionEvent::manager(SessionEventKind::SessionChanged));
            Ok(())
        });

        let token = manager.CurrentSessionChanged(&handler)?;
        let unregister: Unregister = Box::new(move || {
            let _ = manager.RemoveCurrentSessionChanged(token);
        });
        Ok(Registrations(vec![unregister]))
    }

    fn unwatch_manager(&mut self, watch: Registrations) {
        watch.release();
    }

    fn watch_session(
        &mut self,
        session: &Session,
        generation: u64,
        events: EventSender,
    ) -> Result<Registrations, DetectError> {
        let mut registrations: Vec<Unregister> = Vec::with_capacity(3);

        let token = session.MediaPropertiesChanged(&notifier(
            &events,
            generation,
            SessionEventKind::MediaPropertiesChanged,
        ))?;
        let owner = session.clone();
        registrations.push(Box::new(move || {
            let _ = owner.RemoveMediaPropertiesChanged(token);
        }));

        let token =
            match session.TimelinePropertiesChanged(&notifier(
                &events,
                generation,
                SessionEventKind::TimelineChanged,
            )) {
                Ok(token) => token,
                Err(e) => {
                    Registrations(registrations).release();
                    return Err(e.into());
                }
            };
        let owner = session.clone();
        registrations.push(Box::new(move || {
            let _ = owner.RemoveTimelinePropertiesChanged(token);
        }));

        let token =
            match session.PlaybackInfoChanged(&notifier(
                &events,
                generation,
                SessionEventKind::PlaybackInfoChanged,
            )) {
                Ok(token) => token,
                Err(e) => {
                    Registrations(registrations).release();
                    return Err(e.into());
                }
            };
        let owner = session.clone();
        registrations.push(Box::new(move || {
            let _ = owner.RemovePlaybackInfoChanged(token);
        }));

        Ok(Registrations(registrations))
    }

    fn unwatch_session(&mut self, _session: &Session, watch: Registrations) {
        watch.release();
    }

    fn disconnect(&mut self) {
        self.manager = None;
    }
}

/// Handler forwarding one session callback into the event channel.
fn notifier<T, A>(
    events: &EventSender,
    generation: u64,
    kind: SessionEventKind,
) -> TypedEventHandler<T, A>
where
    T: RuntimeType + 'static,
    A: RuntimeType + 'static,
{
    let tx = events.clone();
    TypedEventHandler::new(move |_, _| {
        let _ = tx.send(SessionEvent { generation, kind });
        Ok(())
    })
}

fn read_session(session: &Session) -> Result<MediaRecord, DetectError> {
    let props = session.TryGetMediaPropertiesAsync()?.get()?;

    let mut record = MediaRecord::new(
        NATIVE_SOURCE_ID,
        props.Artist()?.to_string(),
        props.Title()?.to_string(),
    );
    record.subtitle = non_empty(props.Subtitle()?.to_string());
    record.album_title = non_empty(props.AlbumTitle()?.to_string());
    record.album_artist = non_empty(props.AlbumArtist()?.to_string());
    record.album_track_count = props.AlbumTrackCount().ok().and_then(positive);
    record.track_number = props.TrackNumber().ok().and_then(positive);
    if let Ok(genres) = props.Genres() {
        record.genres = genres.into_iter().map(|g| g.to_string()).collect();
    }
    record.thumbnail = props.Thumbnail().ok().map(ThumbnailRef::Stream);
    record.timeline = Some(read_timeline(session)?);

    Ok(record)
}

fn read_timeline(session: &Session) -> Result<Timeline, DetectError> {
    let timeline = session.GetTimelineProperties()?;
    let info = session.GetPlaybackInfo()?;

    let playback_status = match info.PlaybackStatus()? {
        SmtcStatus::Playing => PlaybackStatus::Playing,
        SmtcStatus::Paused => PlaybackStatus::Paused,
        SmtcStatus::Stopped => PlaybackStatus::Stopped,
        _ => PlaybackStatus::Other,
    };
    let playback_rate = info
        .PlaybackRate()
        .and_then(|rate| rate.Value())
        .unwrap_or(1.0);
    let playback_type = info
        .PlaybackType()
        .and_then(|t| t.Value())
        .ok()
        .map(|t| {
            match t {
                MediaPlaybackType::Music => "Music",
                MediaPlaybackType::Video => "Video",
                MediaPlaybackType::Image => "Image",
                _ => "Unknown",
            }
            .to_string()
        });
    let repeat_mode = info
        .AutoRepeatMode()
        .and_then(|m| m.Value())
        .ok()
        .map(|m| match m {
            MediaPlaybackAutoRepeatMode::Track => RepeatMode::Track,
            MediaPlaybackAutoRepeatMode::List => RepeatMode::List,
            _ => RepeatMode::None,
        });
    let is_shuffle_active = info.IsShuffleActive().and_then(|s| s.Value()).ok();

    Ok(Timeline {
        position: span(timeline.Position()?),
        start_time: span(timeline.StartTime()?),
        end_time: span(timeline.EndTime()?),
        min_seek_time: span(timeline.MinSeekTime()?),
        max_seek_time: span(timeline.MaxSeekTime()?),
        last_updated_time: Timeline::from_filetime_ticks(timeline.LastUpdatedTime()?.UniversalTime),
        playback_status,
        playback_rate,
        playback_type,
        repeat_mode,
        is_shuffle_active,
    })
}

fn read_stream(reference: &IRandomAccessStreamReference) -> Result<Vec<u8>, DetectError> {
    let stream = reference.OpenReadAsync()?.get()?;
    let input = stream.GetInputStreamAt(0)?;
    let reader = DataReader::CreateDataReader(&input)?;
    reader.SetInputStreamOptions(InputStreamOptions::Partial)?;

    let mut bytes = Vec::new();
    loop {
        let loaded = reader.LoadAsync(CHUNK_SIZE as u32)?.get()?;
        if loaded == 0 {
            break;
        }
        let mut chunk = vec![0u8; loaded as usize];
        reader.ReadBytes(&mut chunk)?;
        bytes.extend_from_slice(&chunk);
    }
    if bytes.is_empty() {
        warn!("SMTC thumbnail stream was empty");
    }
    Ok(bytes)
}

/// `TimeSpan` counts 100ns ticks.
fn span(value: TimeSpan) -> Duration {
    Duration::microseconds(value.Duration / 10)
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

fn positive(value: i32) -> Option<u32> {
    u32::try_from(value).ok().filter(|v| *v > 0)
}
