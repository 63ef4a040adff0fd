use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

/// Scratch directory for album art.
///
/// Every stored thumbnail gets a fresh file name so the host never reads a
/// half-written image; the previous file is removed once the new one is in
/// place. The directory goes away when the store is dropped.
#[derive(Debug)]
pub struct ThumbnailStore {
    dir: TempDir,
    counter: u64,
    current: Option<PathBuf>,
}

impl ThumbnailStore {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("onair_thumbs_").tempdir()?;
        debug!(dir = %dir.path().display(), "Thumbnail scratch directory created");
        Ok(Self {
            dir,
            counter: 0,
            current: None,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn current(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    /// Write `bytes` to a new file and return its path.
    pub async fn store(&mut self, bytes: Vec<u8>) -> io::Result<PathBuf> {
        self.counter += 1;
        let path = self.dir.path().join(format!("thumbnail-{}", self.counter));
        tokio::fs::write(&path, bytes).await?;

        if let Some(previous) = self.current.replace(path.clone()) {
            remove_quietly(&previous).await;
        }
        Ok(path)
    }

    /// Drop the current thumbnail file, if any.
    pub async fn clear(&mut self) {
        if let Some(previous) = self.current.take() {
            remove_quietly(&previous).await;
        }
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Failed to remove old thumbnail: {e}"),
    }
}
