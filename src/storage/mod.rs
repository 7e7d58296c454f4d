//! Blob storage for recman.
//!
//! This module provides the object-store capability used by the record
//! lifecycle service:
//! - [`BlobStore`] trait: put/get/list/delete over keyed blobs in one bucket
//! - S3-compatible backend (feature `s3`)
//! - Local filesystem backend
//! - In-memory backend

mod filesystem;
mod memory;
#[cfg(feature = "s3")]
mod s3;

pub use filesystem::FsBlobStore;
pub use memory::MemoryBlobStore;
#[cfg(feature = "s3")]
pub use s3::S3BlobStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::{StorageBackend, StorageConfig};
use crate::{RecmanError, Result};

/// Storage class reported by the local backends.
pub const STANDARD_STORAGE_CLASS: &str = "STANDARD";

/// Owner of a stored object as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobOwner {
    /// Canonical owner ID.
    pub id: String,
    /// Display name.
    pub display_name: Option<String>,
}

/// Metadata for one blob, as returned by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobMetadata {
    /// Bucket the blob lives in.
    pub bucket_name: String,
    /// Blob key (the externally visible filename).
    pub key: String,
    /// Content tag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: DateTime<Utc>,
    /// Storage tier label.
    pub storage_class: String,
    /// Owner, when the backend reports one.
    pub owner: Option<BlobOwner>,
}

/// One page of a bucket listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Entries on this page.
    pub entries: Vec<BlobMetadata>,
    /// Token to pass to the next `list` call.
    pub next_token: Option<String>,
    /// Whether more pages follow.
    pub is_truncated: bool,
}

/// Errors reported by blob store backends.
#[derive(Error, Debug)]
pub enum BlobError {
    /// No blob under this key.
    #[error("no such key: {0}")]
    NotFound(String),

    /// Reading the blob body failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Any other backend fault.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Object-store capability over a single bucket.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Bucket this store operates on.
    fn bucket(&self) -> &str;

    /// Upload the contents of the local file at `source` under `key`.
    async fn put(&self, key: &str, source: &Path) -> std::result::Result<(), BlobError>;

    /// Fetch the full content of a blob.
    ///
    /// Returns [`BlobError::NotFound`] when the key does not exist.
    async fn get(&self, key: &str) -> std::result::Result<Bytes, BlobError>;

    /// List one page of the bucket, starting after `continuation_token`.
    async fn list(
        &self,
        continuation_token: Option<String>,
    ) -> std::result::Result<ListPage, BlobError>;

    /// Delete a blob. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> std::result::Result<(), BlobError>;
}

/// Build the blob store selected by the configuration.
pub async fn open_blob_store(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!(bucket = %config.bucket, "Using in-memory blob store");
            Ok(Arc::new(
                MemoryBlobStore::new(&config.bucket).with_page_size(config.page_size),
            ))
        }
        StorageBackend::Filesystem => {
            let store = FsBlobStore::new(&config.filesystem_path, &config.bucket)?
                .with_page_size(config.page_size);
            tracing::info!(
                bucket = %config.bucket,
                path = %store.bucket_path().display(),
                "Using filesystem blob store"
            );
            Ok(Arc::new(store))
        }
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let store = S3BlobStore::new(&config.bucket, &config.s3).await?;
            tracing::info!(bucket = %config.bucket, "Using S3 blob store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(RecmanError::Config(
            "S3 backend requested but recman was built without the `s3` feature".to_string(),
        )),
    }
}

/// Reject keys that cannot be used as a single path component.
pub(crate) fn validate_key(key: &str) -> std::result::Result<(), BlobError> {
    if key.is_empty() || key == "." || key == ".." || key.contains(['/', '\\', '\0']) {
        return Err(BlobError::Backend(format!("invalid key: {key:?}")));
    }
    Ok(())
}

/// Quoted SHA-256 hex digest of the content, in the style of an S3 etag.
pub(crate) fn content_etag(content: &[u8]) -> String {
    format!("\"{:x}\"", Sha256::digest(content))
}

/// Select one page from keys sorted in ascending order.
///
/// Returns the keys on the page, the continuation token (last key of the page)
/// and whether more keys follow.
pub(crate) fn page_of_keys<I>(
    sorted_keys: I,
    continuation_token: Option<&str>,
    page_size: usize,
) -> (Vec<String>, Option<String>, bool)
where
    I: IntoIterator<Item = String>,
{
    let page_size = page_size.max(1);
    let mut page: Vec<String> = sorted_keys
        .into_iter()
        .filter(|k| continuation_token.map_or(true, |t| k.as_str() > t))
        .take(page_size + 1)
        .collect();

    let is_truncated = page.len() > page_size;
    if is_truncated {
        page.truncate(page_size);
    }
    let next_token = if is_truncated { page.last().cloned() } else { None };

    (page, next_token, is_truncated)
}

impl From<BlobError> for RecmanError {
    fn from(e: BlobError) -> Self {
        match e {
            BlobError::NotFound(key) => RecmanError::NotExist(format!("blob {key}")),
            BlobError::Read(msg) => RecmanError::IoFailure(msg),
            BlobError::Backend(msg) => RecmanError::Unknown(msg),
        }
    }
}
