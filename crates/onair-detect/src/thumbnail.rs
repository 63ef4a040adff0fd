//! Album-art retrieval for URL thumbnail references.

use tokio::io::AsyncReadExt;
use tracing::debug;
use url::Url;

use crate::error::DetectError;

/// Read size for thumbnail streams.
pub const CHUNK_SIZE: usize = 8192;

/// Fetch the bytes behind a `file://` or `http(s)://` thumbnail URL.
///
/// HTTP error statuses are returned as errors.
pub async fn fetch_url(client: &reqwest::Client, raw: &str) -> Result<Vec<u8>, DetectError> {
    let url = Url::parse(raw)?;
    let bytes = match url.scheme() {
        "file" => read_file(&url).await?,
        "http" | "https" => download(client, url).await?,
        _ => return Err(DetectError::UnsupportedThumbnail(raw.to_string())),
    };
    debug!(url = raw, bytes = bytes.len(), "Fetched thumbnail");
    Ok(bytes)
}

async fn read_file(url: &Url) -> Result<Vec<u8>, DetectError> {
    let path = url
        .to_file_path()
        .map_err(|_| DetectError::UnsupportedThumbnail(url.to_string()))?;
    let mut file = tokio::fs::File::open(&path).await?;

    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..read]);
    }
    Ok(bytes)
}

async fn download(client: &reqwest::Client, url: Url) -> Result<Vec<u8>, DetectError> {
    let mut response = client.get(url).send().await?.error_for_status()?;

    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
