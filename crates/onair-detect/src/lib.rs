pub mod error;
pub mod platform;
pub mod players;
pub mod record;
pub mod session;
pub mod thumbnail;
pub mod window;

pub use error::DetectError;
pub use platform::NativeBackend;
pub use players::{
    find_player, FieldOrder, ParsedTitle, PlayerDef, TitleRule, KNOWN_PLAYERS, UNKNOWN_ARTIST,
};
pub use record::{MediaRecord, PlaybackStatus, RepeatMode, ThumbnailRef, Timeline};
pub use session::{
    ClientState, EventSender, NullBackend, SessionBackend, SessionClient, SessionEvent,
    SessionEventKind, NATIVE_SOURCE_ID,
};
pub use window::{scrape, WindowInfo};

/// List the visible top-level windows on this host.
///
/// Always empty on platforms without a window-scraping backend.
pub fn enumerate_windows() -> Vec<WindowInfo> {
    platform::enumerate_windows()
}
