//! Known media players and the window-title heuristics used to read them.

use serde::{Deserialize, Serialize};

/// Artist reported for players whose title only carries a file name.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Which side of the first separator holds the artist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrder {
    #[default]
    ArtistFirst,
    TitleFirst,
}

/// Artist and track extracted from a window title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTitle {
    pub artist: String,
    pub title: String,
}

impl ParsedTitle {
    fn new(artist: &str, title: &str) -> Option<Self> {
        let (artist, title) = (artist.trim(), title.trim());
        if artist.is_empty() && title.is_empty() {
            return None;
        }
        Some(Self {
            artist: artist.to_string(),
            title: title.to_string(),
        })
    }
}

/// Split rule applied to a player's window title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleRule {
    /// `"Artist - Track"`, split at the first `-`.
    Separated(FieldOrder),
    /// `"Artist - Track <marker>"`; the marker must be present.
    ///
    /// Without a second `-` the whole text before the marker is the artist.
    Suffixed { marker: &'static str },
    /// `"Artist - [Album] Track <marker>"`, or `"Track <marker>"` without an artist.
    Bracketed { marker: &'static str },
    /// `"file.ext - <suffix>"`; only the file name is known.
    FilenameOnly { suffix: &'static str },
}

impl TitleRule {
    /// Apply the rule. A title without the rule's marker is "no match".
    pub fn parse(&self, title: &str) -> Option<ParsedTitle> {
        match *self {
            TitleRule::Separated(order) => {
                let (left, right) = title.split_once('-')?;
                match order {
                    FieldOrder::ArtistFirst => ParsedTitle::new(left, right),
                    FieldOrder::TitleFirst => ParsedTitle::new(right, left),
                }
            }
            TitleRule::Suffixed { marker } => {
                let body = &title[..title.rfind(marker)?];
                match body.split_once('-') {
                    Some((artist, track)) => ParsedTitle::new(artist, track),
                    None => ParsedTitle::new(body, ""),
                }
            }
            TitleRule::Bracketed { marker } => {
                let body = &title[..title.rfind(marker)?];
                let Some((artist, rest)) = body.split_once('-') else {
                    return ParsedTitle::new("", body);
                };
                let track = match rest.find(']') {
                    Some(close) => &rest[close + 1..],
                    None => rest,
                };
                ParsedTitle::new(artist, track)
            }
            TitleRule::FilenameOnly { suffix } => {
                if !title.contains('-') {
                    return None;
                }
                let body = &title[..title.rfind(suffix)?];
                let track = body.trim_end_matches(|c: char| c == '-' || c.is_whitespace());
                if track.is_empty() {
                    return None;
                }
                ParsedTitle::new(UNKNOWN_ARTIST, track)
            }
        }
    }

    /// Same rule with the separator field order replaced.
    ///
    /// Only [`TitleRule::Separated`] has a field order; other rules are returned as is.
    pub fn with_field_order(self, order: FieldOrder) -> Self {
        match self {
            TitleRule::Separated(_) => TitleRule::Separated(order),
            other => other,
        }
    }
}

/// A window-scraped media player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerDef {
    /// Stable id, also the host setting key that toggles the player.
    pub id: &'static str,
    pub name: &'static str,
    /// Process image basenames owned by the player.
    pub executables: &'static [&'static str],
    pub rule: TitleRule,
}

impl PlayerDef {
    /// Whether `image_path` (full path or bare file name) is one of this player's executables.
    pub fn matches_executable(&self, image_path: &str) -> bool {
        let basename = image_path
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(image_path);
        self.executables
            .iter()
            .any(|exe| executable_eq(exe, basename))
    }

    pub fn parse_title(&self, title: &str) -> Option<ParsedTitle> {
        self.rule.parse(title)
    }

    pub fn with_field_order(mut self, order: FieldOrder) -> Self {
        self.rule = self.rule.with_field_order(order);
        self
    }
}

#[cfg(target_os = "windows")]
fn executable_eq(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

#[cfg(not(target_os = "windows"))]
fn executable_eq(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// Look up a catalog entry by id.
pub fn find_player(id: &str) -> Option<&'static PlayerDef> {
    KNOWN_PLAYERS.iter().find(|p| p.id == id)
}

/// Window-scraped players, in precedence order.
pub static KNOWN_PLAYERS: &[PlayerDef] = &[
    PlayerDef {
        id: "spotify",
        name: "Spotify",
        executables: &["Spotify.exe"],
        rule: TitleRule::Separated(FieldOrder::ArtistFirst),
    },
    PlayerDef {
        id: "vlc",
        name: "VLC",
        executables: &["vlc.exe"],
        rule: TitleRule::Suffixed {
            marker: "- VLC media player",
        },
    },
    PlayerDef {
        id: "yt_firefox",
        name: "YouTube for Firefox",
        executables: &["firefox.exe"],
        rule: TitleRule::Suffixed { marker: "- YouTube" },
    },
    PlayerDef {
        id: "yt_chrome",
        name: "YouTube for Chrome",
        executables: &["chrome.exe"],
        rule: TitleRule::Suffixed { marker: "- YouTube" },
    },
    PlayerDef {
        id: "foobar2000",
        name: "foobar2000",
        executables: &["foobar2000.exe"],
        rule: TitleRule::Bracketed {
            marker: " [foobar2000]",
        },
    },
    PlayerDef {
        id: "necloud",
        name: "Netease Cloud Music",
        executables: &["cloudmusic.exe"],
        rule: TitleRule::Separated(FieldOrder::TitleFirst),
    },
    PlayerDef {
        id: "aimp",
        name: "AIMP",
        executables: &["AIMP.exe"],
        rule: TitleRule::Separated(FieldOrder::ArtistFirst),
    },
    PlayerDef {
        id: "potplayer",
        name: "PotPlayer (file name only)",
        executables: &["PotPlayerMini.exe", "PotPlayerMini64.exe"],
        rule: TitleRule::FilenameOnly {
            suffix: " PotPlayer",
        },
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(artist: &str, title: &str) -> Option<ParsedTitle> {
        Some(ParsedTitle {
            artist: artist.into(),
            title: title.into(),
        })
    }

    #[test]
    fn test_separated_splits_at_first_hyphen() {
        let rule = TitleRule::Separated(FieldOrder::ArtistFirst);
        assert_eq!(rule.parse("Daft Punk - One More Time"), parsed("Daft Punk", "One More Time"));
        assert_eq!(rule.parse("A - B - C"), parsed("A", "B - C"));
        assert_eq!(rule.parse("Spotify Premium"), None);
    }

    #[test]
    fn test_separated_title_first() {
        let rule = TitleRule::Separated(FieldOrder::TitleFirst);
        assert_eq!(rule.parse("Song - Singer"), parsed("Singer", "Song"));
    }

    #[test]
    fn test_separated_bare_hyphen_is_no_match() {
        let rule = TitleRule::Separated(FieldOrder::ArtistFirst);
        assert_eq!(rule.parse(" - "), None);
    }

    #[test]
    fn test_youtube_title() {
        let yt = find_player("yt_firefox").unwrap();
        assert_eq!(
            yt.parse_title("Rick Astley - Never Gonna Give You Up - YouTube"),
            parsed("Rick Astley", "Never Gonna Give You Up")
        );
        assert_eq!(
            yt.parse_title("A - B - C - YouTube"),
            parsed("A", "B - C")
        );
        assert_eq!(yt.parse_title("Artist - Track - Mozilla Firefox"), None);
        assert_eq!(
            yt.parse_title("Lofi Beats To Study To - YouTube"),
            parsed("Lofi Beats To Study To", "")
        );
        let chrome = find_player("yt_chrome").unwrap();
        assert_eq!(
            chrome.parse_title("Lofi Beats To Study To - YouTube"),
            parsed("Lofi Beats To Study To", "")
        );
    }

    #[test]
    fn test_vlc_title() {
        let vlc = find_player("vlc").unwrap();
        assert_eq!(
            vlc.parse_title("Radiohead - Creep - VLC media player"),
            parsed("Radiohead", "Creep")
        );
        assert_eq!(
            vlc.parse_title("movie.mkv - VLC media player"),
            parsed("movie.mkv", "")
        );
        assert_eq!(vlc.parse_title("VLC media player"), None);
    }

    #[test]
    fn test_foobar_without_artist() {
        let foobar = find_player("foobar2000").unwrap();
        assert_eq!(foobar.parse_title("My Song [foobar2000]"), parsed("", "My Song"));
    }

    #[test]
    fn test_foobar_with_album_bracket() {
        let foobar = find_player("foobar2000").unwrap();
        assert_eq!(
            foobar.parse_title("Boards of Canada - [Geogaddi #03] Music Is Math [foobar2000]"),
            parsed("Boards of Canada", "Music Is Math")
        );
        assert_eq!(
            foobar.parse_title("Boards of Canada - Roygbiv [foobar2000]"),
            parsed("Boards of Canada", "Roygbiv")
        );
        assert_eq!(foobar.parse_title("foobar2000 v2.1"), None);
    }

    #[test]
    fn test_potplayer_filename_only() {
        let pot = find_player("potplayer").unwrap();
        assert_eq!(
            pot.parse_title("concert.mp4 - PotPlayer"),
            parsed(UNKNOWN_ARTIST, "concert.mp4")
        );
        assert_eq!(pot.parse_title("PotPlayer"), None);
    }

    #[test]
    fn test_necloud_field_order_override() {
        let necloud = find_player("necloud").unwrap();
        assert_eq!(necloud.parse_title("Song - Singer"), parsed("Singer", "Song"));
        let swapped = necloud.with_field_order(FieldOrder::ArtistFirst);
        assert_eq!(swapped.parse_title("Singer - Song"), parsed("Singer", "Song"));
    }

    #[test]
    fn test_field_order_only_affects_separated() {
        let rule = TitleRule::Suffixed { marker: "- YouTube" };
        assert_eq!(rule.with_field_order(FieldOrder::TitleFirst), rule);
    }

    #[test]
    fn test_matches_executable_by_basename() {
        let vlc = find_player("vlc").unwrap();
        assert!(vlc.matches_executable(r"C:\Program Files\VideoLAN\VLC\vlc.exe"));
        assert!(vlc.matches_executable("vlc.exe"));
        assert!(!vlc.matches_executable(r"C:\Windows\notvlc.exe"));
        let pot = find_player("potplayer").unwrap();
        assert!(pot.matches_executable(r"D:\Apps\PotPlayerMini64.exe"));
    }

    #[test]
    fn test_catalog_ids_unique() {
        let mut ids: Vec<_> = KNOWN_PLAYERS.iter().map(|p| p.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), KNOWN_PLAYERS.len());
    }
}
