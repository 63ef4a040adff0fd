use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    /// The OS has a session but cannot hand out its properties yet.
    #[error("media session not ready")]
    NotReady,

    #[error("native media control is not available on this platform")]
    Unsupported,

    #[error("session manager is not connected")]
    NotConnected,

    #[error("session backend error: {0}")]
    Backend(String),

    #[error("unsupported thumbnail reference: {0}")]
    UnsupportedThumbnail(String),

    #[error("invalid thumbnail URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("thumbnail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[cfg(target_os = "windows")]
    #[error("windows error: {0}")]
    Windows(windows::core::Error),
}

#[cfg(target_os = "windows")]
impl From<windows::core::Error> for DetectError {
    fn from(err: windows::core::Error) -> Self {
        // HRESULT_FROM_WIN32(ERROR_NOT_READY)
        const NOT_READY: windows::core::HRESULT = windows::core::HRESULT(0x8007_0015_u32 as i32);

        if err.code() == NOT_READY {
            DetectError::NotReady
        } else {
            DetectError::Windows(err)
        }
    }
}

impl DetectError {
    /// Transient errors are expected during normal operation and are logged quietly.
    pub fn is_transient(&self) -> bool {
        matches!(self, DetectError::NotReady | DetectError::NotConnected)
    }
}
