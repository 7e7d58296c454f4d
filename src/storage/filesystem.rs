//! Local filesystem blob store.
//!
//! Each bucket is a directory under the base path and each blob is a single
//! file named by its key:
//! ```text
//! {base_path}/
//! └── {bucket}/
//!     ├── 2024_08_31_09_15_00_000_1725095700_report.txt
//!     └── ...
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::Result;

use super::{
    page_of_keys, validate_key, BlobError, BlobMetadata, BlobStore, ListPage,
    STANDARD_STORAGE_CLASS,
};

/// Blob store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    bucket: String,
    bucket_path: PathBuf,
    page_size: usize,
}

impl FsBlobStore {
    /// Create a store for `bucket` under `base_path`.
    ///
    /// The bucket directory will be created if it doesn't exist.
    pub fn new(base_path: impl AsRef<Path>, bucket: &str) -> Result<Self> {
        let bucket_path = base_path.as_ref().join(bucket);
        fs::create_dir_all(&bucket_path)?;

        Ok(Self {
            bucket: bucket.to_string(),
            bucket_path,
            page_size: 1000,
        })
    }

    /// Set the listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Directory holding this bucket's blobs.
    pub fn bucket_path(&self) -> &Path {
        &self.bucket_path
    }

    fn blob_path(&self, key: &str) -> std::result::Result<PathBuf, BlobError> {
        validate_key(key)?;
        Ok(self.bucket_path.join(key))
    }

    async fn sorted_keys(&self) -> std::result::Result<Vec<String>, BlobError> {
        let mut dir = tokio::fs::read_dir(&self.bucket_path)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to list bucket: {e}")))?;

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| BlobError::Backend(format!("failed to list bucket: {e}")))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file {
                continue;
            }
            // Keys are UTF-8; anything else was not written by this store.
            if let Ok(name) = entry.file_name().into_string() {
                keys.push(name);
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn metadata(&self, key: &str) -> std::result::Result<Option<BlobMetadata>, BlobError> {
        let path = self.bucket_path.join(key);
        let stat = match tokio::fs::metadata(&path).await {
            Ok(stat) => stat,
            // Removed between listing and stat.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BlobError::Backend(format!("failed to stat {key}: {e}"))),
        };
        let modified = stat
            .modified()
            .map_err(|e| BlobError::Backend(format!("failed to stat {key}: {e}")))?;
        let last_modified = DateTime::<Utc>::from(modified);

        Ok(Some(BlobMetadata {
            bucket_name: self.bucket.clone(),
            key: key.to_string(),
            etag: stat_etag(stat.len(), last_modified),
            size: stat.len(),
            last_modified,
            storage_class: STANDARD_STORAGE_CLASS.to_string(),
            owner: None,
        }))
    }
}

/// Entity tag from file size and modification time, so listing never reads content.
fn stat_etag(size: u64, modified: DateTime<Utc>) -> String {
    format!(
        "\"{:x}-{:x}\"",
        size,
        modified.timestamp_nanos_opt().unwrap_or_else(|| modified.timestamp_micros())
    )
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put(&self, key: &str, source: &Path) -> std::result::Result<(), BlobError> {
        let path = self.blob_path(key)?;
        tokio::fs::copy(source, &path)
            .await
            .map_err(|e| BlobError::Backend(format!("failed to store {key}: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> std::result::Result<Bytes, BlobError> {
        let path = self.blob_path(key).map_err(|_| BlobError::NotFound(key.to_string()))?;
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(BlobError::NotFound(key.to_string())),
            Err(e) => Err(BlobError::Read(format!("failed to read {key}: {e}"))),
        }
    }

    async fn list(
        &self,
        continuation_token: Option<String>,
    ) -> std::result::Result<ListPage, BlobError> {
        let keys = self.sorted_keys().await?;
        let (page, next_token, is_truncated) =
            page_of_keys(keys, continuation_token.as_deref(), self.page_size);

        let mut entries = Vec::with_capacity(page.len());
        for key in &page {
            if let Some(meta) = self.metadata(key).await? {
                entries.push(meta);
            }
        }

        Ok(ListPage {
            entries,
            next_token,
            is_truncated,
        })
    }

    async fn delete(&self, key: &str) -> std::result::Result<(), BlobError> {
        let path = self.blob_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BlobError::Backend(format!("failed to delete {key}: {e}"))),
        }
    }
}
