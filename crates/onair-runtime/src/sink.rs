use std::path::Path;

/// Kind of display object a host can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Text,
    Image,
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("display target `{0}` not found")]
    TargetNotFound(String),

    #[error("host rejected update: {0}")]
    Host(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The host's display objects.
///
/// Owned by the worker thread and only called from there. An empty target
/// name means the host's default target, if it has one.
pub trait DisplaySink: Send + 'static {
    fn set_text(&mut self, target: &str, text: &str) -> Result<(), SinkError>;

    /// Point an image target at `path`, or clear it.
    fn set_image(&mut self, target: &str, path: Option<&Path>) -> Result<(), SinkError>;

    /// Target names the host offers for `kind`, for settings pickers.
    fn list_targets(&self, _kind: TargetKind) -> Vec<String> {
        Vec::new()
    }
}
