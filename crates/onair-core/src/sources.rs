//! Capture sources: the native session snapshot plus one window-title scraper per known player.

use std::sync::Arc;

use futures::future::BoxFuture;
use onair_detect::{scrape, MediaRecord, PlayerDef, WindowInfo, KNOWN_PLAYERS, NATIVE_SOURCE_ID};
use tokio::sync::watch;
use tracing::debug;

use crate::config::Config;
use crate::error::OnairError;

/// Inputs shared by all sources during one capture cycle.
#[derive(Debug, Clone, Default)]
pub struct CaptureContext {
    /// Visible windows, enumerated once per cycle.
    pub windows: Arc<Vec<WindowInfo>>,
}

impl CaptureContext {
    pub fn new(windows: Vec<WindowInfo>) -> Self {
        Self {
            windows: Arc::new(windows),
        }
    }
}

/// Something that can report what is playing.
pub trait CaptureSource: Send + Sync {
    fn id(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Whether this source reads the window list.
    fn needs_windows(&self) -> bool {
        false
    }

    /// Pick up source-specific settings.
    fn configure(&mut self, _config: &Config) {}

    fn capture<'a>(
        &'a self,
        ctx: &'a CaptureContext,
    ) -> BoxFuture<'a, Result<Option<MediaRecord>, OnairError>>;
}

/// Reads a player's window title.
pub struct WindowTitleSource {
    base: &'static PlayerDef,
    player: PlayerDef,
}

impl WindowTitleSource {
    pub fn new(base: &'static PlayerDef) -> Self {
        Self { base, player: *base }
    }

    pub fn player(&self) -> &PlayerDef {
        &self.player
    }
}

impl CaptureSource for WindowTitleSource {
    fn id(&self) -> &str {
        self.player.id
    }

    fn display_name(&self) -> &str {
        self.player.name
    }

    fn needs_windows(&self) -> bool {
        true
    }

    fn configure(&mut self, config: &Config) {
        self.player = if self.base.id == "necloud" {
            self.base.with_field_order(config.parsing.necloud_field_order)
        } else {
            *self.base
        };
    }

    fn capture<'a>(
        &'a self,
        ctx: &'a CaptureContext,
    ) -> BoxFuture<'a, Result<Option<MediaRecord>, OnairError>> {
        Box::pin(async move {
            let record = scrape(&ctx.windows, &self.player).map(|parsed| {
                debug!(
                    source = self.player.id,
                    artist = %parsed.artist,
                    title = %parsed.title,
                    "Window title matched"
                );
                MediaRecord::new(self.player.id, parsed.artist, parsed.title)
            });
            Ok(record)
        })
    }
}

/// Latest snapshot published by the native session client.
pub type NativeSnapshot = Option<Arc<MediaRecord>>;

/// Serves the most recent native session snapshot.
///
/// The session client lives in the worker loop and publishes into a `watch`
/// channel; this source only reads it.
pub struct NativeSnapshotSource {
    latest: watch::Receiver<NativeSnapshot>,
}

impl NativeSnapshotSource {
    pub fn new(latest: watch::Receiver<NativeSnapshot>) -> Self {
        Self { latest }
    }
}

impl CaptureSource for NativeSnapshotSource {
    fn id(&self) -> &str {
        NATIVE_SOURCE_ID
    }

    fn display_name(&self) -> &str {
        "System media session"
    }

    fn capture<'a>(
        &'a self,
        _ctx: &'a CaptureContext,
    ) -> BoxFuture<'a, Result<Option<MediaRecord>, OnairError>> {
        let record = self.latest.borrow().as_deref().cloned();
        Box::pin(async move { Ok(record) })
    }
}

struct CatalogEntry {
    source: Box<dyn CaptureSource>,
    enabled: bool,
}

/// Ordered set of capture sources. Order is precedence.
#[derive(Default)]
pub struct SourceCatalog {
    entries: Vec<CatalogEntry>,
}

impl SourceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The native source (when given) followed by every known player.
    pub fn standard(native: Option<Box<dyn CaptureSource>>) -> Self {
        let mut catalog = Self::new();
        if let Some(native) = native {
            catalog.register(native);
        }
        for player in KNOWN_PLAYERS {
            catalog.register(Box::new(WindowTitleSource::new(player)));
        }
        catalog
    }

    /// Append a source, enabled. A source with an already registered id replaces it in place.
    pub fn register(&mut self, source: Box<dyn CaptureSource>) {
        match self.entries.iter_mut().find(|e| e.source.id() == source.id()) {
            Some(entry) => entry.source = source,
            None => self.entries.push(CatalogEntry {
                source,
                enabled: true,
            }),
        }
    }

    pub fn apply_config(&mut self, config: &Config) {
        for entry in &mut self.entries {
            entry.enabled = config.is_source_enabled(entry.source.id());
            entry.source.configure(config);
        }
    }

    /// Enabled sources in precedence order.
    pub fn enabled(&self) -> impl Iterator<Item = &dyn CaptureSource> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.source.as_ref())
    }

    pub fn needs_windows(&self) -> bool {
        self.enabled().any(|s| s.needs_windows())
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.enabled && e.source.id() == id)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.source.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
