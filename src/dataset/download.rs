//! Retrieval of the monthly db-ip datasets and removal of stale ones.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use reqwest::Client;
use std::fs;
use std::io::{self, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use super::{DatasetDirectory, DatasetKind};
use crate::utils::format_bytes;

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY_MS: u64 = 2000;

/// Downloads missing current-period datasets into a [`DatasetDirectory`].
pub struct Downloader {
    client: Client,
    base_url: String,
}

impl Downloader {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("geonft/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };

        Ok(Self { client, base_url })
    }

    /// URL of the gzipped dataset for `kind` and `period`.
    pub fn url_for(&self, kind: DatasetKind, period: &str) -> String {
        format!("{}{}.gz", self.base_url, kind.file_name(period))
    }

    /// Fetch every dataset of the directory's period that is not on disk yet.
    ///
    /// The kinds are independent and fetched concurrently. A failed kind is
    /// logged and left to the fallback selection.
    pub async fn fetch_missing(&self, datasets: &DatasetDirectory) -> Vec<(DatasetKind, Result<PathBuf>)> {
        use futures::stream::{self, StreamExt};

        let root = datasets.root();
        if let Err(e) = fs::create_dir_all(root) {
            error!("Cannot create database directory {}: {}", root.display(), e);
        }

        let missing: Vec<DatasetKind> = DatasetKind::ALL
            .into_iter()
            .filter(|kind| !root.join(kind.file_name(datasets.period())).is_file())
            .collect();

        if missing.is_empty() {
            debug!("All {} databases present", datasets.period());
        }

        stream::iter(missing.into_iter().map(|kind| async move {
            let result = self.fetch_one(kind, datasets.period(), root).await;
            if let Err(ref e) = result {
                error!("error while downloading {} database: {:#}", kind, e);
            }
            (kind, result)
        }))
        .buffer_unordered(DatasetKind::ALL.len())
        .collect()
        .await
    }

    async fn fetch_one(&self, kind: DatasetKind, period: &str, root: &Path) -> Result<PathBuf> {
        let url = self.url_for(kind, period);
        let target = root.join(kind.file_name(period));

        info!("downloading {}", kind.file_name(period));
        let mut compressed = self.fetch_with_retry(&url, root).await?;
        let size = compressed.as_file().metadata().map(|m| m.len()).unwrap_or(0);
        debug!("Fetched {} ({})", url, format_bytes(size));
        compressed.seek(SeekFrom::Start(0))?;

        let dir = root.to_path_buf();
        let path = target.clone();
        // The compressed temp file is removed when the task drops it
        tokio::task::spawn_blocking(move || unpack_to(BufReader::new(compressed), &dir, &path))
            .await
            .context("Decompression task failed")??;

        Ok(target)
    }

    /// Stream the body of `url` into a temp file in `dir`. A transfer cut off
    /// halfway is retried like a failed request.
    async fn fetch_with_retry(&self, url: &str, dir: &Path) -> Result<NamedTempFile> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay = RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!("Retry {} after {}ms for {}", attempt, delay, url);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.client.get(url).send().await {
                Ok(response) if response.status().is_success() => {
                    match stream_to_temp(response, dir).await {
                        Ok(file) => return Ok(file),
                        Err(e) => last_error = Some(e),
                    }
                }
                Ok(response) => {
                    last_error = Some(anyhow::anyhow!("HTTP {} for {}", response.status(), url));
                }
                Err(e) => last_error = Some(e.into()),
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Unknown error")))
    }
}

/// Write a response body chunk by chunk into a new temp file in `dir`.
async fn stream_to_temp(mut response: reqwest::Response, dir: &Path) -> Result<NamedTempFile> {
    let mut temp = tempfile::Builder::new()
        .prefix(".geonft-download-")
        .tempfile_in(dir)
        .context("Failed to create temporary download file")?;

    while let Some(chunk) = response
        .chunk()
        .await
        .context("Failed to read response body")?
    {
        temp.write_all(&chunk)?;
    }
    temp.flush()?;

    Ok(temp)
}

/// Gunzip `compressed` into `target`, going through a temp file in `dir` so a
/// partial download never shows up under the dataset name.
fn unpack_to<R: Read>(compressed: R, dir: &Path, target: &Path) -> Result<()> {
    let mut temp = NamedTempFile::new_in(dir).context("Failed to create temporary dataset file")?;
    let mut decoder = GzDecoder::new(compressed);
    io::copy(&mut decoder, &mut temp).context("Failed to decompress dataset")?;
    temp.flush()?;
    temp.persist(target)
        .with_context(|| format!("Failed to persist {}", target.display()))?;
    Ok(())
}

/// Remove datasets from earlier periods.
///
/// A kind is only cleaned when its current-period file exists, so the
/// fallback selection keeps something to read when a download failed.
/// Returns the removed paths.
pub fn cleanup_stale(datasets: &DatasetDirectory) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    for kind in DatasetKind::ALL {
        let current = datasets.root().join(kind.file_name(datasets.period()));
        if !current.is_file() {
            debug!("Keeping old {} databases, current one missing", kind);
            continue;
        }

        for (path, _) in datasets.candidates(kind) {
            if path == current {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed stale database {}", path.display());
                    removed.push(path);
                }
                Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }

    removed
}
