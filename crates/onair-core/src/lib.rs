pub mod aggregator;
pub mod config;
pub mod debug_log;
pub mod error;
pub mod render;
pub mod sources;

pub use aggregator::{
    capture_all, select_canonical, Aggregator, CaptureReport, CycleKind, SourceFailure,
};
pub use config::{Config, DisplayConfig, DisplayMode, GeneralConfig, LogLevel, ParsingConfig};
pub use debug_log::{shared_event_log, DebugEvent, EventEntry, EventLog, SharedEventLog};
pub use error::{OnairError, RenderError};
pub use render::{Expression, Renderer, Template};
pub use sources::{
    CaptureContext, CaptureSource, NativeSnapshot, NativeSnapshotSource, SourceCatalog,
    WindowTitleSource,
};
