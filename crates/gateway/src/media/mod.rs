use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Body;
use std::path::Path;
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::config::HelixWareConfig;

/// Media downloaded from HelixWare into the cache directory; the file is
/// removed when this is dropped.
pub struct CachedMedia {
    file: NamedTempFile,
    pub len: u64,
}

impl CachedMedia {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Streams the cached file as a request body.
    pub fn body(&self) -> Result<Body> {
        let file = tokio::fs::File::from_std(self.file.reopen()?);
        Ok(Body::wrap_stream(FramedRead::new(file, BytesCodec::new())))
    }
}

/// Fetches `url` with the HelixWare application headers into `cache_dir`.
pub async fn download(
    http: &reqwest::Client,
    url: &str,
    credentials: &HelixWareConfig,
    cache_dir: &Path,
) -> Result<CachedMedia> {
    tokio::fs::create_dir_all(cache_dir)
        .await
        .with_context(|| format!("Cannot create cache directory {:?}", cache_dir))?;

    let named = tempfile::Builder::new()
        .prefix("mico-")
        .suffix(".tmp")
        .tempfile_in(cache_dir)?;

    let response = http
        .get(url)
        .header("X-Application-Key", &credentials.application_key)
        .header("X-Application-Secret", &credentials.application_secret)
        .send()
        .await
        .with_context(|| format!("Failed to download asset [ url: {} ]", url))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("Asset download failed [ url: {} ]: {}", url, status);
    }

    let mut out = tokio::fs::File::from_std(named.reopen()?);
    let mut stream = response.bytes_stream();
    let mut len = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.with_context(|| format!("Asset download interrupted [ url: {} ]", url))?;
        out.write_all(&chunk).await?;
        len += chunk.len() as u64;
    }
    out.flush().await?;

    Ok(CachedMedia { file: named, len })
}
