use std::path::PathBuf;
use std::sync::Arc;

use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Semaphore;
use url::Url;

use crate::transfer::TransferConfig;

const DEFAULT_BASE_URL: &str = "https://firebasestorage.googleapis.com";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error("base url cannot carry object paths")]
    InvalidBaseUrl,
    #[error("concurrency limiter is closed")]
    ConcurrencyClosed,
    #[error("{source}; leftover {} could not be removed: {cleanup}", path.display())]
    PartialLeftover {
        path: PathBuf,
        source: Box<StorageError>,
        cleanup: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    NotFound,
    Auth,
    RateLimit,
    Transient,
    Permanent,
}

/// Client for the `/v0/b/{bucket}/o` object API.
///
/// Object names are relative paths such as `trips/42/images/a.jpg`; they travel as a single
/// percent-encoded path segment.
#[derive(Clone)]
pub struct StorageClient {
    pub(crate) http: Client,
    base_url: Url,
    bucket: String,
    token: Option<String>,
    pub(crate) download_limit: Arc<Semaphore>,
    pub(crate) upload_limit: Arc<Semaphore>,
}

impl StorageClient {
    pub fn new(bucket: impl Into<String>, token: Option<String>) -> Result<Self, StorageError> {
        Self::with_base_url(DEFAULT_BASE_URL, bucket, token)
    }

    pub fn with_base_url(
        base_url: &str,
        bucket: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, StorageError> {
        Self::with_config(base_url, bucket, token, TransferConfig::default())
    }

    pub fn with_config(
        base_url: &str,
        bucket: impl Into<String>,
        token: Option<String>,
        config: TransferConfig,
    ) -> Result<Self, StorageError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(StorageError::InvalidBaseUrl);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            bucket: bucket.into(),
            token,
            download_limit: Arc::new(Semaphore::new(config.download_concurrency.max(1))),
            upload_limit: Arc::new(Semaphore::new(config.upload_concurrency.max(1))),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub async fn get_metadata(&self, name: &str) -> Result<ObjectMetadata, StorageError> {
        let url = self.object_url(name)?;
        let response = self.authorized(self.http.get(url)).send().await?;
        Self::handle_response(response).await
    }

    pub async fn delete_object(&self, name: &str) -> Result<(), StorageError> {
        let url = self.object_url(name)?;
        let response = self.authorized(self.http.delete(url)).send().await?;
        Self::check_status(response).await?;
        Ok(())
    }

    pub(crate) fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    pub(crate) fn object_url(&self, name: &str) -> Result<Url, StorageError> {
        let mut url = self.bucket_url()?;
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidBaseUrl)?
            .push(name);
        Ok(url)
    }

    pub(crate) fn bucket_url(&self) -> Result<Url, StorageError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidBaseUrl)?
            .pop_if_empty()
            .extend(["v0", "b", self.bucket.as_str(), "o"]);
        Ok(url)
    }

    pub(crate) async fn handle_response<T: serde::de::DeserializeOwned>(
        response: Response,
    ) -> Result<T, StorageError> {
        let response = Self::check_status(response).await?;
        Ok(response.json::<T>().await?)
    }

    pub(crate) async fn check_status(response: Response) -> Result<Response, StorageError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::Api { status, body })
        }
    }
}

impl StorageError {
    pub fn classification(&self) -> Option<ApiErrorClass> {
        match self {
            StorageError::Api { status, .. } => Some(classify_api_status(*status)),
            _ => None,
        }
    }

    /// The object does not exist. Probes treat this as a negative answer rather than a failure.
    pub fn is_not_found(&self) -> bool {
        self.classification() == Some(ApiErrorClass::NotFound)
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            StorageError::Request(_) => true,
            _ => matches!(
                self.classification(),
                Some(ApiErrorClass::RateLimit | ApiErrorClass::Transient)
            ),
        }
    }
}

fn classify_api_status(status: StatusCode) -> ApiErrorClass {
    if status == StatusCode::NOT_FOUND {
        ApiErrorClass::NotFound
    } else if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ApiErrorClass::RateLimit
    } else if status.is_server_error()
        || matches!(status, StatusCode::REQUEST_TIMEOUT | StatusCode::CONFLICT)
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub name: String,
    #[serde(default)]
    pub bucket: Option<String>,
    // The API reports sizes as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub md5_hash: Option<String>,
}

impl ObjectMetadata {
    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref()?.parse().ok()
    }
}
