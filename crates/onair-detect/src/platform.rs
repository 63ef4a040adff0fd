#[cfg(target_os = "linux")]
pub mod linux_mpris;

#[cfg(target_os = "windows")]
pub mod windows;

#[cfg(target_os = "windows")]
pub mod windows_smtc;

use crate::window::WindowInfo;

/// Well-known MPRIS multiplexer that follows the most recently active player.
pub const PLAYERCTLD_BUS: &str = "org.mpris.MediaPlayer2.playerctld";

/// Native session backend for the current platform.
#[cfg(target_os = "linux")]
pub type NativeBackend = linux_mpris::MprisBackend;

#[cfg(target_os = "windows")]
pub type NativeBackend = windows_smtc::SmtcBackend;

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
pub type NativeBackend = crate::session::NullBackend;

/// Platform-specific window enumeration dispatcher.
pub fn enumerate_windows() -> Vec<WindowInfo> {
    #[cfg(target_os = "windows")]
    {
        windows::enumerate_windows()
    }
    #[cfg(not(target_os = "windows"))]
    {
        vec![]
    }
}

/// Pick the MPRIS endpoint to follow: `playerctld` when present, else the first player.
pub fn select_mpris_bus(names: &[String]) -> Option<&str> {
    names
        .iter()
        .find(|name| name.as_str() == PLAYERCTLD_BUS)
        .or_else(|| names.first())
        .map(String::as_str)
}
