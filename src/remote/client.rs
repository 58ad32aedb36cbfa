// ABOUTME: Resolves each table's Parquet file from the local tree, a cache or a release download
// ABOUTME: Every large-table file is checksum-verified against the manifest before loading

use crate::config::{Layout, ReleaseSource};
use crate::error::DistError;
use crate::manifest::{Category, TableEntry};
use crate::migration::checksum::sha256_file;
use crate::remote::models::asset_url;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::USER_AGENT;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

const CLIENT_USER_AGENT: &str = "pronunciation-db-builder/1.0";

/// Where large-table files come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    /// Read `data/release/` under the distribution root; never touch the network
    Local,
    /// Download into the cache directory from a release
    Remote(ReleaseSource),
}

/// Resolves table files for the loader
pub struct AssetFetcher {
    root: PathBuf,
    layout: Layout,
    mode: FetchMode,
    client: reqwest::Client,
    show_progress: bool,
}

impl AssetFetcher {
    pub fn new(root: &Path, layout: &Layout, mode: FetchMode) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            root: root.to_path_buf(),
            layout: layout.clone(),
            mode,
            client,
            show_progress: true,
        })
    }

    /// Disable the download progress bar (tests, non-interactive runs)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    /// Path of the Parquet file to load for `table`
    ///
    /// Lookup tables always resolve to their path in the distribution tree.
    /// Large tables resolve to `data/release/` in local mode, or to the
    /// download cache in remote mode, fetching when the cached copy is absent
    /// or does not match the manifest checksum.
    ///
    /// The returned path may not exist (missing lookup or local file); the
    /// loader records that as a warning and skips the table.
    ///
    /// # Errors
    ///
    /// - [`DistError::ChecksumMismatch`] for a local large file with the wrong
    ///   digest, or for a download that does not match after fetching
    /// - [`DistError::TransferFailure`] for network errors and non-success
    ///   HTTP statuses
    pub async fn resolve(&self, table: &str, entry: &TableEntry) -> Result<PathBuf> {
        if entry.category == Category::Lookup {
            return Ok(self.root.join(&entry.parquet_path));
        }

        let file_name = Layout::table_file_name(table);
        match &self.mode {
            FetchMode::Local => {
                let path = self.root.join(&self.layout.release_dir).join(&file_name);
                if path.exists() {
                    verify_checksum(&path, &entry.sha256)?;
                }
                Ok(path)
            }
            FetchMode::Remote(source) => {
                let path = self.root.join(&self.layout.download_dir).join(&file_name);
                if path.exists() {
                    if checksum_matches(&path, &entry.sha256)? {
                        tracing::info!("  Using cached {}", path.display());
                        return Ok(path);
                    }
                    tracing::warn!(
                        "  Cached {} does not match manifest checksum, re-downloading",
                        path.display()
                    );
                }

                let url = asset_url(source, &file_name);
                self.download(&url, &path).await?;

                if !checksum_matches(&path, &entry.sha256)? {
                    let actual = sha256_file(&path)?;
                    std::fs::remove_file(&path).with_context(|| {
                        format!("Failed to remove corrupt download {}", path.display())
                    })?;
                    return Err(DistError::ChecksumMismatch {
                        path,
                        expected: entry.sha256.clone(),
                        actual,
                    }
                    .into());
                }
                tracing::info!("    SHA-256 verified ✓");
                Ok(path)
            }
        }
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<()> {
        tracing::info!("  Downloading {}", url);

        let transfer = |reason: String| DistError::TransferFailure {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await
            .map_err(|e| transfer(e.to_string()))?;

        if !response.status().is_success() {
            return Err(transfer(format!("HTTP {}", response.status())).into());
        }

        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create download directory {}", parent.display()))?;

        let progress = self.progress_bar(response.content_length());

        // Stream into a temp file so a failed transfer never leaves a partial asset at `dest`
        let tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        let mut file = tokio::fs::File::create(tmp.path())
            .await
            .with_context(|| format!("Failed to open {}", tmp.path().display()))?;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| transfer(e.to_string()))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
            progress.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);
        progress.finish_and_clear();

        tmp.persist(dest)
            .with_context(|| format!("Failed to move download into {}", dest.display()))?;
        Ok(())
    }

    fn progress_bar(&self, total: Option<u64>) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                if let Ok(style) = ProgressStyle::default_bar()
                    .template("    {bar:40.cyan/blue} {percent:>3}% ({bytes}/{total_bytes})")
                {
                    bar.set_style(style);
                }
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("{spinner:.green} {bytes} downloaded")
                {
                    bar.set_style(style);
                }
                bar.enable_steady_tick(Duration::from_millis(100));
                bar
            }
        }
    }
}

fn checksum_matches(path: &Path, expected: &str) -> Result<bool> {
    if expected.is_empty() {
        return Ok(true);
    }
    Ok(sha256_file(path)?.eq_ignore_ascii_case(expected))
}

fn verify_checksum(path: &Path, expected: &str) -> Result<()> {
    if checksum_matches(path, expected)? {
        return Ok(());
    }
    Err(DistError::ChecksumMismatch {
        path: path.to_path_buf(),
        expected: expected.to_string(),
        actual: sha256_file(path)?,
    }
    .into())
}
