use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use crate::client::{ObjectMetadata, StorageClient, StorageError};

#[derive(Debug, Clone, Copy)]
pub struct TransferConfig {
    pub download_concurrency: usize,
    pub upload_concurrency: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_concurrency: 4,
            upload_concurrency: 2,
        }
    }
}

impl StorageClient {
    /// Streams the object into `target`, overwriting it. Bytes land in a sibling `.partial`
    /// file first so a failed transfer never leaves a truncated target behind.
    pub async fn download_to_path(&self, name: &str, target: &Path) -> Result<(), StorageError> {
        let _permit = self
            .download_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::ConcurrencyClosed)?;
        let mut url = self.object_url(name)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self.authorized(self.http.get(url)).send().await?;
        let response = Self::check_status(response).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(target);
        match write_partial(response, &partial, target).await {
            Ok(()) => Ok(()),
            Err(err) => match tokio::fs::remove_file(&partial).await {
                Ok(()) => Err(err),
                Err(cleanup) if cleanup.kind() == std::io::ErrorKind::NotFound => Err(err),
                Err(cleanup) => Err(StorageError::PartialLeftover {
                    path: partial,
                    source: Box::new(err),
                    cleanup,
                }),
            },
        }
    }

    pub async fn upload_from_path(
        &self,
        name: &str,
        source: &Path,
    ) -> Result<ObjectMetadata, StorageError> {
        let _permit = self
            .upload_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StorageError::ConcurrencyClosed)?;
        let mut url = self.bucket_url()?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", name);
        let file = tokio::fs::File::open(source).await?;
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        let response = self
            .authorized(self.http.post(url))
            .header("Content-Type", content_type_for(name))
            .body(body)
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

async fn write_partial(
    response: reqwest::Response,
    partial: &Path,
    target: &Path,
) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(partial).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    tokio::fs::rename(partial, target).await?;
    Ok(())
}

fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("heic") => "image/heic",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    }
}

fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
