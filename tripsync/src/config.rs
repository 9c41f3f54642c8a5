use std::path::{Path, PathBuf};

use anyhow::Context;
use tripsync_core::TransferConfig;

use crate::sync::DEFAULT_BATCH_SIZE;

const DEFAULT_STORAGE_URL: &str = "https://firebasestorage.googleapis.com";
const DEFAULT_APP_DIR: &str = "tripsync";
const DEFAULT_UPLOAD_CONCURRENCY: u64 = 2;
const DEFAULT_DOWNLOAD_CONCURRENCY: u64 = 4;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Root that identities resolve under.
    pub docs_root: PathBuf,
    pub storage_url: String,
    pub bucket: String,
    pub token: Option<String>,
    pub batch_size: usize,
    pub transfer: TransferConfig,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let docs_root = std::env::var("TRIPSYNC_DOCS_DIR")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(|value| expand_with_home(&value, &home))
            .unwrap_or_else(|| default_docs_root(&home));
        let storage_url =
            std::env::var("TRIPSYNC_STORAGE_URL").unwrap_or_else(|_| DEFAULT_STORAGE_URL.to_string());
        let bucket = std::env::var("TRIPSYNC_BUCKET")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .context("TRIPSYNC_BUCKET is not set")?;
        let token = std::env::var("TRIPSYNC_TOKEN")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        let batch_size = read_u64_env("TRIPSYNC_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64) as usize;
        let transfer = transfer_from_env();

        Ok(Self {
            docs_root,
            storage_url,
            bucket,
            token,
            batch_size,
            transfer,
        })
    }
}

fn transfer_from_env() -> TransferConfig {
    TransferConfig {
        upload_concurrency: read_u64_env("TRIPSYNC_UPLOAD_CONCURRENCY", DEFAULT_UPLOAD_CONCURRENCY)
            as usize,
        download_concurrency: read_u64_env(
            "TRIPSYNC_DOWNLOAD_CONCURRENCY",
            DEFAULT_DOWNLOAD_CONCURRENCY,
        ) as usize,
    }
}

fn default_docs_root(home: &Path) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| home.join(".local/share"))
        .join(DEFAULT_APP_DIR)
        .join("docs")
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}
