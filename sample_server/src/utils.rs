//! Utility functions
//!
use std::{
    fs::File,
    io::Cursor,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use reqwest::Client;

/// Fetch a URL into memory.
///
/// There is no retry or timeout policy; a failed fetch propagates to the
/// caller.
pub async fn fetch_bytes(client: &Client, url: &str) -> Result<Vec<u8>> {
    let resp = client.get(url).send().await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

/// Download a file from a URL to a given filepath.
pub async fn download_file(
    client: &Client,
    url: &str,
    filepath: impl AsRef<Path>,
) -> Result<()> {
    let resp = client.get(url).send().await?.error_for_status()?;

    let mut file = File::create(filepath)?;
    let mut content = Cursor::new(resp.bytes().await?);
    std::io::copy(&mut content, &mut file)?;

    Ok(())
}

/// Resolve a file in the model directory, downloading it on first use.
pub async fn ensure_cached(dir: &Path, file_name: &str, url: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    if !path.exists() {
        log::info!("Downloading {} to {}", url, path.display());
        download_file(&Client::new(), url, &path).await?;
    }
    Ok(path)
}

/// Resolve a file that must already be present in the model directory.
///
/// Used for converted models that have no public mirror to download from.
pub fn require_cached(dir: &Path, file_name: &str) -> Result<PathBuf> {
    let path = dir.join(file_name);
    if !path.exists() {
        anyhow::bail!(
            "model file {} not found, place it in {}",
            file_name,
            dir.display()
        );
    }
    Ok(path)
}

/// Model directory from the command line, or the per-user cache.
pub fn default_model_dir(from_args: Option<PathBuf>) -> Result<PathBuf> {
    match from_args {
        Some(dir) => Ok(dir),
        None => Ok(dirs::cache_dir()
            .context("no cache directory on this platform")?
            .join("nn_samples")),
    }
}

/// Load class labels, one per line.
pub fn load_labels(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(|line| line.trim().to_owned()).collect())
}

/// Median of the given values.
///
/// Panics on an empty slice; callers only report medians once at least one
/// value was recorded.
pub fn median(values: &mut [f32]) -> f32 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let mid = values.len() / 2;
    if values.len() % 2 != 0 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_median_odd() {
        let mut values = [9.0, 1.0, 5.0];
        assert_eq!(median(&mut values), 5.0);
    }

    #[test]
    fn test_median_even() {
        let mut values = [4.0, 1.0, 2.0, 3.0];
        assert_eq!(median(&mut values), 2.5);
    }

    #[test]
    fn test_median_single() {
        let mut values = [7.5];
        assert_eq!(median(&mut values), 7.5);
    }
}
