//! In-memory blob store.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::clock::{Clock, SystemClock};

use super::{
    content_etag, page_of_keys, BlobError, BlobMetadata, BlobStore, ListPage,
    STANDARD_STORAGE_CLASS,
};

#[derive(Debug, Clone)]
struct StoredBlob {
    content: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
}

/// Blob store held entirely in process memory.
///
/// Listing is sorted by key and paginated, so the continuation loop of callers
/// is exercised the same way as against a real bucket.
pub struct MemoryBlobStore {
    bucket: String,
    page_size: usize,
    clock: Arc<dyn Clock>,
    blobs: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Create an empty store for `bucket`.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            page_size: 1000,
            clock: Arc::new(SystemClock),
            blobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Use `clock` for last-modified timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Number of stored blobs.
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    fn metadata(&self, key: &str, blob: &StoredBlob) -> BlobMetadata {
        BlobMetadata {
            bucket_name: self.bucket.clone(),
            key: key.to_string(),
            etag: blob.etag.clone(),
            size: blob.content.len() as u64,
            last_modified: blob.last_modified,
            storage_class: STANDARD_STORAGE_CLASS.to_string(),
            owner: None,
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, source: &Path) -> Result<(), BlobError> {
        let content = tokio::fs::read(source)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to read {}: {e}", source.display())))?;

        let blob = StoredBlob {
            etag: content_etag(&content),
            content: Bytes::from(content),
            last_modified: self.clock.now(),
        };
        self.blobs.write().await.insert(key.to_string(), blob);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobError> {
        self.blobs
            .read()
            .await
            .get(key)
            .map(|b| b.content.clone())
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn list(&self, continuation_token: Option<String>) -> Result<ListPage, BlobError> {
        let blobs = self.blobs.read().await;
        let (keys, next_token, is_truncated) =
            page_of_keys(blobs.keys().cloned(), continuation_token.as_deref(), self.page_size);

        let entries = keys
            .iter()
            .filter_map(|k| blobs.get(k).map(|b| self.metadata(k, b)))
            .collect();

        Ok(ListPage {
            entries,
            next_token,
            is_truncated,
        })
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.blobs.write().await.remove(key);
        Ok(())
    }
}
