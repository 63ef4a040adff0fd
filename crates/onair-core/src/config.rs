use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use directories::ProjectDirs;
use onair_detect::{FieldOrder, KNOWN_PLAYERS, NATIVE_SOURCE_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{trace, warn};

use crate::error::OnairError;

const DEFAULT_CONFIG: &str = include_str!("../../../config/default.toml");

pub const CHECK_FREQUENCY_RANGE: (u64, u64) = (150, 60_000);
pub const REFRESH_INTERVAL_RANGE: (u64, u64) = (100, 60_000);
pub const CAPTURE_TIMEOUT_RANGE: (u64, u64) = (100, 60_000);

/// Top-level configuration snapshot.
///
/// Never mutated in place by the runtime: every settings change produces a new value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    pub display: DisplayConfig,
    /// Per-source enable flags, keyed by source id. Missing ids are enabled.
    pub sources: BTreeMap<String, bool>,
    pub parsing: ParsingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub enabled: bool,
    /// Window-title polling period, ms.
    pub check_frequency: u64,
    /// Timeline re-render period, ms.
    pub refresh_interval: u64,
    pub capture_timeout_ms: u64,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
    /// `%artist` / `%title` template.
    pub text: String,
    /// Display expression.
    pub expr: String,
    /// Text target id.
    pub source_name: String,
    /// Image target id; empty disables album art.
    pub thumbsource_name: String,
    /// Shown when rendering fails.
    pub fallback_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    Template,
    Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsingConfig {
    pub necloud_field_order: FieldOrder,
}

/// Log verbosity, including a level that silences everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Silent,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
            LogLevel::Silent => "silent",
        }
    }

    /// `EnvFilter` directive for this level.
    pub fn directive(&self) -> &'static str {
        match self {
            LogLevel::Silent => "off",
            other => other.as_str(),
        }
    }
}

impl FromStr for LogLevel {
    type Err = OnairError;

    /// Accepts the host's level names as well (`NOTSET`, `WARNING`, `CRITICAL`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" | "notset" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" | "critical" | "critial" | "fatal" => Ok(LogLevel::Error),
            "silent" | "off" => Ok(LogLevel::Silent),
            other => Err(OnairError::Config(format!("unknown log level `{other}`"))),
        }
    }
}

impl From<String> for LogLevel {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_else(|e| {
            warn!("{e}, using info");
            LogLevel::Info
        })
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        level.as_str().to_string()
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Config {
    /// Load config: user file (if exists) merged over built-in defaults.
    pub fn load() -> Result<Self, OnairError> {
        let user_path = Self::config_path();
        if user_path.exists() {
            Self::load_from(&user_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load `path` merged over built-in defaults.
    pub fn load_from(path: &Path) -> Result<Self, OnairError> {
        let user_str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&user_str)
    }

    /// Parse a (possibly partial) TOML document over the built-in defaults.
    pub fn from_toml_str(user_str: &str) -> Result<Self, OnairError> {
        let mut merged: toml::Value =
            toml::from_str(DEFAULT_CONFIG).map_err(|e| OnairError::Config(e.to_string()))?;
        let user: toml::Value =
            toml::from_str(user_str).map_err(|e| OnairError::Config(e.to_string()))?;
        merge_toml(&mut merged, user);

        let config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| OnairError::Config(e.to_string()))?;
        Ok(config.validated())
    }

    /// Save current config to the user config file.
    pub fn save(&self) -> Result<(), OnairError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), OnairError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| OnairError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path to user config file (XDG on Linux, AppData on Windows).
    pub fn config_path() -> PathBuf {
        Self::project_dirs()
            .map(|d| d.config_dir().join("config.toml"))
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "onair")
    }

    /// Build a complete snapshot from the host's flat settings object.
    ///
    /// Starts from the built-in defaults; unknown keys and values of the wrong
    /// type are ignored.
    pub fn from_host_settings(settings: &serde_json::Map<String, JsonValue>) -> Self {
        let mut config = Self::default();

        for (key, value) in settings {
            let applied = match key.as_str() {
                "enabled" => set(&mut config.general.enabled, value.as_bool()),
                "check_frequency" => set(&mut config.general.check_frequency, value.as_u64()),
                "refresh_interval" => set(&mut config.general.refresh_interval, value.as_u64()),
                "capture_timeout_ms" => {
                    set(&mut config.general.capture_timeout_ms, value.as_u64())
                }
                "log_level" => set(
                    &mut config.general.log_level,
                    value.as_str().map(|s| LogLevel::from(s.to_string())),
                ),
                "debug_mode" => {
                    if value.as_bool() == Some(true) && !settings.contains_key("log_level") {
                        config.general.log_level = LogLevel::Debug;
                    }
                    value.is_boolean()
                }
                "display_text" => set(&mut config.display.text, string(value)),
                "display_expr" => set(&mut config.display.expr, string(value)),
                "display_mode" => set(
                    &mut config.display.mode,
                    serde_json::from_value(value.clone()).ok(),
                ),
                "source_name" => set(&mut config.display.source_name, string(value)),
                "thumbsource_name" => set(&mut config.display.thumbsource_name, string(value)),
                "fallback_text" => set(&mut config.display.fallback_text, string(value)),
                "necloud_field_order" => set(
                    &mut config.parsing.necloud_field_order,
                    serde_json::from_value(value.clone()).ok(),
                ),
                id if is_source_id(id) => match value.as_bool() {
                    Some(enabled) => {
                        config.sources.insert(id.to_string(), enabled);
                        true
                    }
                    None => false,
                },
                other => {
                    trace!(key = other, "Ignoring unknown host setting");
                    true
                }
            };
            if !applied {
                warn!(key = %key, value = %value, "Ignoring host setting with unexpected type");
            }
        }

        if !settings.contains_key("display_mode") {
            if settings.contains_key("display_expr") {
                config.display.mode = DisplayMode::Expression;
            } else if settings.contains_key("display_text") {
                config.display.mode = DisplayMode::Template;
            }
        }

        config.validated()
    }

    /// Clamp intervals into their supported ranges.
    pub fn validated(mut self) -> Self {
        self.general.check_frequency = clamp_logged(
            "check_frequency",
            self.general.check_frequency,
            CHECK_FREQUENCY_RANGE,
        );
        self.general.refresh_interval = clamp_logged(
            "refresh_interval",
            self.general.refresh_interval,
            REFRESH_INTERVAL_RANGE,
        );
        self.general.capture_timeout_ms = clamp_logged(
            "capture_timeout_ms",
            self.general.capture_timeout_ms,
            CAPTURE_TIMEOUT_RANGE,
        );
        self
    }

    pub fn is_source_enabled(&self, id: &str) -> bool {
        self.sources.get(id).copied().unwrap_or(true)
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("built-in default config is valid TOML")
    }
}

fn set<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn string(value: &JsonValue) -> Option<String> {
    value.as_str().map(str::to_string)
}

fn is_source_id(id: &str) -> bool {
    id == NATIVE_SOURCE_ID || KNOWN_PLAYERS.iter().any(|p| p.id == id)
}

fn clamp_logged(key: &str, value: u64, (min, max): (u64, u64)) -> u64 {
    let clamped = value.clamp(min, max);
    if clamped != value {
        warn!(key, value, clamped, "Setting out of range, clamping");
    }
    clamped
}

/// Recursively overlay `overlay` tables onto `base`.
fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn host(value: JsonValue) -> serde_json::Map<String, JsonValue> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_config_parses() {
        let config = Config::default();
        assert!(config.general.enabled);
        assert_eq!(config.general.check_frequency, 1000);
        assert_eq!(config.general.refresh_interval, 500);
        assert_eq!(config.general.capture_timeout_ms, 3000);
        assert_eq!(config.general.log_level, LogLevel::Info);
        assert_eq!(config.display.mode, DisplayMode::Expression);
        assert_eq!(config.display.text, "%artist - %title");
        assert!(config.display.expr.starts_with("'NO MEDIA'"));
        assert_eq!(config.display.fallback_text, "...");
        assert_eq!(config.parsing.necloud_field_order, FieldOrder::TitleFirst);
    }

    #[test]
    fn test_default_enables_every_source() {
        let config = Config::default();
        assert!(config.is_source_enabled(NATIVE_SOURCE_ID));
        for player in KNOWN_PLAYERS {
            assert!(config.is_source_enabled(player.id), "{} disabled", player.id);
        }
        assert!(config.is_source_enabled("not-listed"));
    }

    #[test]
    fn test_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_partial_user_file_merges_over_defaults() {
        let config = Config::from_toml_str(
            r#"
            [general]
            check_frequency = 2500

            [sources]
            spotify = false
            "#,
        )
        .unwrap();
        assert_eq!(config.general.check_frequency, 2500);
        assert_eq!(config.general.refresh_interval, 500);
        assert!(!config.is_source_enabled("spotify"));
        assert!(config.is_source_enabled("vlc"));
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.display.source_name = "Now Playing".into();
        config.general.log_level = LogLevel::Silent;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_user_file_is_config_error() {
        let err = Config::from_toml_str("[general\n").unwrap_err();
        assert!(matches!(err, OnairError::Config(_)));
    }

    #[test]
    fn test_host_settings_flat_keys() {
        let config = Config::from_host_settings(&host(json!({
            "enabled": false,
            "check_frequency": 2000,
            "display_text": "%title by %artist",
            "source_name": "Text",
            "thumbsource_name": "Art",
            "vlc": false,
            "log_level": "WARNING",
            "some_future_key": 42,
        })));
        assert!(!config.general.enabled);
        assert_eq!(config.general.check_frequency, 2000);
        assert_eq!(config.display.text, "%title by %artist");
        assert_eq!(config.display.mode, DisplayMode::Template);
        assert_eq!(config.display.source_name, "Text");
        assert_eq!(config.display.thumbsource_name, "Art");
        assert!(!config.is_source_enabled("vlc"));
        assert!(config.is_source_enabled("spotify"));
        assert_eq!(config.general.log_level, LogLevel::Warn);
    }

    #[test]
    fn test_host_settings_are_wholesale() {
        let first = Config::from_host_settings(&host(json!({ "spotify": false })));
        assert!(!first.is_source_enabled("spotify"));
        let second = Config::from_host_settings(&host(json!({})));
        assert!(second.is_source_enabled("spotify"));
        assert_eq!(second, Config::default());
    }

    #[test]
    fn test_host_settings_mode_inference() {
        let expr = Config::from_host_settings(&host(json!({ "display_expr": "title" })));
        assert_eq!(expr.display.mode, DisplayMode::Expression);

        let explicit = Config::from_host_settings(&host(json!({
            "display_expr": "title",
            "display_mode": "template",
        })));
        assert_eq!(explicit.display.mode, DisplayMode::Template);
    }

    #[test]
    fn test_host_settings_wrong_type_keeps_default() {
        let config = Config::from_host_settings(&host(json!({ "check_frequency": "fast" })));
        assert_eq!(config.general.check_frequency, 1000);
    }

    #[test]
    fn test_host_settings_debug_mode() {
        let config = Config::from_host_settings(&host(json!({ "debug_mode": true })));
        assert_eq!(config.general.log_level, LogLevel::Debug);
        let config = Config::from_host_settings(&host(json!({
            "debug_mode": true,
            "log_level": "ERROR",
        })));
        assert_eq!(config.general.log_level, LogLevel::Error);
    }

    #[test]
    fn test_host_settings_necloud_order() {
        let config =
            Config::from_host_settings(&host(json!({ "necloud_field_order": "artist_first" })));
        assert_eq!(config.parsing.necloud_field_order, FieldOrder::ArtistFirst);
    }

    #[test]
    fn test_validated_clamps_intervals() {
        let config = Config::from_host_settings(&host(json!({
            "check_frequency": 10,
            "refresh_interval": 1_000_000,
        })));
        assert_eq!(config.general.check_frequency, 150);
        assert_eq!(config.general.refresh_interval, 60_000);
    }

    #[test]
    fn test_validated_clamps_capture_timeout() {
        let config = Config::from_host_settings(&host(json!({ "capture_timeout_ms": 0 })));
        assert_eq!(config.general.capture_timeout_ms, 100);

        let mut config = Config::default();
        config.general.capture_timeout_ms = u64::MAX;
        assert_eq!(config.validated().general.capture_timeout_ms, 60_000);
    }

    #[test]
    fn test_log_level_aliases() {
        assert_eq!("NOTSET".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("CRITICAL".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("CRITIAL".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert_eq!("SILENT".parse::<LogLevel>().unwrap(), LogLevel::Silent);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::from("loud".to_string()), LogLevel::Info);
        assert_eq!(LogLevel::Silent.directive(), "off");
    }
}
