//! Download command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::config::Config;
use crate::dataset::download::{cleanup_stale, Downloader};
use crate::dataset::DatasetDirectory;

/// Run the download command
pub async fn run(config_path: &Path) -> Result<()> {
    let config = Config::load_or_default(config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    let datasets = super::dataset_directory(&config);
    let failed = refresh(&config, &datasets).await?;

    if failed > 0 {
        anyhow::bail!("{} database(s) could not be downloaded", failed);
    }
    Ok(())
}

/// Fetch the missing current-period databases, then clean up old ones if
/// configured. Returns the number of failed downloads.
pub async fn refresh(config: &Config, datasets: &DatasetDirectory) -> Result<usize> {
    let downloader = Downloader::new(&config.download.base_url, config.download.timeout())?;
    let results = downloader.fetch_missing(datasets).await;

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    for (kind, result) in &results {
        if let Ok(path) = result {
            info!("{} database saved to {}", kind, path.display());
        }
    }
    if failed > 0 {
        warn!("{} database(s) not downloaded, older files will be used if present", failed);
    }

    if config.download.cleanup {
        let removed = cleanup_stale(datasets);
        if !removed.is_empty() {
            info!("Removed {} outdated database(s)", removed.len());
        }
    }

    Ok(failed)
}
