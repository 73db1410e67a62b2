use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use relay_core::{CoreError, MediaError, MediaFetcher, MediaKind};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use url::Url;

/// Telegram bots may upload at most 50 MB.
pub const DEFAULT_MAX_BYTES: u64 = 50 * 1024 * 1024;

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

/// Extension of the URL path including the dot, if it looks like one.
fn extension_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    if !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext.to_ascii_lowercase()))
}

/// `<post_id>_<YYYYmmdd_HHMMSS>_<hash8><ext>`
pub fn media_filename(post_id: &str, url: &str, kind: MediaKind, at: DateTime<Utc>) -> String {
    let ext = extension_from_url(url).unwrap_or_else(|| kind.default_extension().to_string());
    format!(
        "{}_{}_{}{}",
        post_id,
        at.format("%Y%m%d_%H%M%S"),
        short_hash(url),
        ext
    )
}

pub struct MediaDownloader {
    http_client: Client,
    root: PathBuf,
    max_bytes: u64,
}

impl MediaDownloader {
    /// Creates `<root>/pics` and `<root>/videos` if missing.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Self::with_limit(root, DEFAULT_MAX_BYTES)
    }

    pub fn with_limit(root: impl Into<PathBuf>, max_bytes: u64) -> Result<Self, CoreError> {
        let root = root.into();
        for kind in [MediaKind::Image, MediaKind::Video] {
            std::fs::create_dir_all(root.join(kind.directory()))?;
        }

        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            http_client,
            root,
            max_bytes,
        })
    }

    pub fn directory_for(&self, kind: MediaKind) -> PathBuf {
        self.root.join(kind.directory())
    }

    async fn stream_to(&self, url: &str, path: &Path) -> Result<u64, CoreError> {
        let failed = |reason: String| MediaError::DownloadFailed {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(failed(format!("HTTP {}", status.as_u16())).into());
        }
        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(failed(format!("{} bytes exceeds the upload limit", length)).into());
            }
        }

        let mut file = tokio::fs::File::create(path).await?;
        let mut written: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| failed(e.to_string()))?;
            written += chunk.len() as u64;
            if written > self.max_bytes {
                return Err(failed("body exceeds the upload limit".to_string()).into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        Ok(written)
    }
}

#[async_trait]
impl MediaFetcher for MediaDownloader {
    async fn download(
        &self,
        url: &str,
        post_id: &str,
        kind: MediaKind,
    ) -> Result<PathBuf, CoreError> {
        let path = self
            .directory_for(kind)
            .join(media_filename(post_id, url, kind, Utc::now()));
        debug!("Downloading {} to {}", url, path.display());

        match self.stream_to(url, &path).await {
            Ok(bytes) => {
                info!(
                    "Successfully downloaded media to {} ({} bytes)",
                    path.display(),
                    bytes
                );
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    if remove_err.kind() != std::io::ErrorKind::NotFound {
                        warn!(
                            "Could not remove partial download {}: {}",
                            path.display(),
                            remove_err
                        );
                    }
                }
                Err(e)
            }
        }
    }
}
