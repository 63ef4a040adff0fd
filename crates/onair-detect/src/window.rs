use serde::Serialize;

use crate::players::{ParsedTitle, PlayerDef};

/// A visible top-level window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowInfo {
    /// Raw OS window handle.
    pub handle: isize,
    /// Full path of the owning process image.
    pub image_path: String,
    pub title: String,
}

impl WindowInfo {
    pub fn new(handle: isize, image_path: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            handle,
            image_path: image_path.into(),
            title: title.into(),
        }
    }
}

/// Find the first window owned by `player` whose title parses.
///
/// Window order is whatever the OS reported; windows of other processes and
/// titles missing the player's marker are skipped.
pub fn scrape(windows: &[WindowInfo], player: &PlayerDef) -> Option<ParsedTitle> {
    windows
        .iter()
        .filter(|w| player.matches_executable(&w.image_path))
        .find_map(|w| player.parse_title(&w.title))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::players::find_player;

    #[test]
    fn test_scrape_matches_process_and_title() {
        let windows = vec![
            WindowInfo::new(1, r"C:\Windows\explorer.exe", "Radiohead - Creep - VLC media player"),
            WindowInfo::new(2, r"C:\VLC\vlc.exe", "VLC media player"),
            WindowInfo::new(3, r"C:\VLC\vlc.exe", "Radiohead - Creep - VLC media player"),
        ];
        let vlc = find_player("vlc").unwrap();
        let parsed = scrape(&windows, vlc).unwrap();
        assert_eq!(parsed.artist, "Radiohead");
        assert_eq!(parsed.title, "Creep");
    }

    #[test]
    fn test_scrape_no_window() {
        let spotify = find_player("spotify").unwrap();
        assert_eq!(scrape(&[], spotify), None);
    }
}
