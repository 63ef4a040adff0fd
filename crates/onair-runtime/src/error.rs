use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("failed to start worker thread: {0}")]
    Spawn(std::io::Error),

    #[error("worker is not running")]
    WorkerGone,

    #[error("worker did not answer within {0:?}")]
    Timeout(Duration),

    #[error("logging setup failed: {0}")]
    Logging(String),
}
