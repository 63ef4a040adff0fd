use std::sync::Arc;

use futures::future::join_all;
use onair_detect::MediaRecord;
use tracing::{debug, warn};

use crate::sources::{CaptureContext, CaptureSource};

/// A source that errored during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: String,
    pub message: String,
}

/// Outcome of running every enabled source once.
#[derive(Debug, Default)]
pub struct CaptureReport {
    /// Records in source precedence order.
    pub records: Vec<MediaRecord>,
    pub failures: Vec<SourceFailure>,
}

/// Run `sources` concurrently. A failing source is logged and left out.
pub async fn capture_all<'a, I>(sources: I, ctx: &CaptureContext) -> CaptureReport
where
    I: IntoIterator<Item = &'a dyn CaptureSource>,
{
    let sources: Vec<&dyn CaptureSource> = sources.into_iter().collect();
    let results = join_all(sources.iter().map(|source| source.capture(ctx))).await;

    let mut report = CaptureReport::default();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(Some(record)) => report.records.push(record),
            Ok(None) => {}
            Err(e) => {
                warn!(source = source.id(), "Capture source failed: {e}");
                report.failures.push(SourceFailure {
                    source: source.id().to_string(),
                    message: e.to_string(),
                });
            }
        }
    }
    report
}

/// First non-empty record wins.
pub fn select_canonical(records: Vec<MediaRecord>) -> Option<MediaRecord> {
    records.into_iter().find(|record| !record.is_empty())
}

/// Why a cycle runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    /// Sources were queried.
    Full,
    /// Timeline-only tick; sources were not queried.
    Refresh,
}

/// Holds the canonical record between cycles.
#[derive(Debug, Default)]
pub struct Aggregator {
    current: Option<Arc<MediaRecord>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a cycle and return the record to render.
    ///
    /// A refresh with nothing new keeps the previous record; a full cycle
    /// with nothing clears it.
    pub fn commit(
        &mut self,
        kind: CycleKind,
        selected: Option<MediaRecord>,
    ) -> Option<Arc<MediaRecord>> {
        match (kind, selected) {
            (_, Some(record)) => {
                debug!(
                    source = %record.source,
                    artist = %record.artist,
                    title = %record.title,
                    "Selected now playing"
                );
                self.current = Some(Arc::new(record));
            }
            (CycleKind::Refresh, None) => {}
            (CycleKind::Full, None) => {
                if self.current.take().is_some() {
                    debug!("Nothing playing, clearing");
                }
            }
        }
        self.current.clone()
    }

    pub fn current(&self) -> Option<Arc<MediaRecord>> {
        self.current.clone()
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
