mod client;
mod transfer;

pub use client::{ApiErrorClass, ObjectMetadata, StorageClient, StorageError};
pub use transfer::TransferConfig;
pub use reqwest::StatusCode;
