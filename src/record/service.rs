//! Record lifecycle service.
//!
//! Coordinates the blob store and the record store: uploads write the blob
//! and then the record, deletes remove the blob and then mark the record
//! unavailable. Neither sequence is atomic.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::key::{generate_key, original_file_name};
use super::repository::RecordStore;
use super::{Actor, Record, RecordView, UploadRequest};
use crate::clock::Clock;
use crate::datetime::ElapsedFormatter;
use crate::storage::{BlobMetadata, BlobStore};
use crate::{RecmanError, Result};

/// Record lifecycle service.
pub struct RecordService {
    blobs: Arc<dyn BlobStore>,
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    formatter: ElapsedFormatter,
    temp_dir: Option<PathBuf>,
}

impl RecordService {
    /// Create a new RecordService.
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        records: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        formatter: ElapsedFormatter,
    ) -> Self {
        Self {
            blobs,
            records,
            clock,
            formatter,
            temp_dir: None,
        }
    }

    /// Stage uploads in `dir` instead of the system temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Attach elapsed-time strings to a record.
    pub fn view(&self, record: Record) -> RecordView {
        let now = self.clock.now();
        RecordView {
            elapsed_creation_time: self.formatter.format(record.creation_date_time, now),
            elapsed_update_time: self.formatter.format(record.latest_update_date_time, now),
            record,
        }
    }

    /// Store a file and create its record.
    pub async fn upload(&self, request: UploadRequest, actor: &Actor) -> Result<RecordView> {
        let original_name = original_file_name(&request.original_name)
            .ok_or_else(|| RecmanError::InvalidRequest("file name is empty".to_string()))?;

        let now = self.clock.now();
        let key = generate_key(now, &original_name);
        info!(key = %key, size = request.content.len(), "Uploading file");

        // The temp file is removed when `staged` drops, on every path.
        let staged = self.stage(&request.content).await?;
        self.blobs.put(&key, staged.path()).await.map_err(|e| {
            error!(key = %key, "Blob write failed: {}", e);
            RecmanError::UploadFailure(e.to_string())
        })?;
        drop(staged);
        debug!(key = %key, "Temporary upload file released");

        let metadata = self
            .search_exact(&key)
            .await
            .map_err(|e| {
                error!(key = %key, "Metadata lookup after upload failed: {}", e);
                RecmanError::UploadFailure(e.to_string())
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                RecmanError::UploadFailure(format!("no metadata for {key} after upload"))
            })?;

        let patient_id = request
            .patient_id
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| actor.name.clone());

        let record = Record {
            id: Uuid::new_v4().to_string(),
            record_name: key,
            patient_id,
            creation_date_time: now,
            latest_update_date_time: metadata.last_modified,
            available: true,
            updated_by_user: actor.name.clone(),
            blob_metadata: Some(metadata),
        };
        let saved = self.records.save(&record).await.map_err(|e| {
            error!(key = %record.record_name, "Record save after upload failed: {}", e);
            RecmanError::UploadFailure(e.to_string())
        })?;
        info!(id = %saved.id, key = %saved.record_name, "Record created");

        Ok(self.view(saved))
    }

    /// List store entries whose key equals `name`.
    pub async fn search_exact(&self, name: &str) -> Result<Vec<BlobMetadata>> {
        self.scan(|key| key == name).await
    }

    /// List store entries whose key contains `name`.
    pub async fn search_contains(&self, name: &str) -> Result<Vec<BlobMetadata>> {
        self.scan(|key| key.contains(name)).await
    }

    /// Look up the record named exactly `name`.
    pub async fn search_records_exact(&self, name: &str) -> Result<Vec<RecordView>> {
        let record = self
            .records
            .find_by_exact_name(name)
            .await?
            .ok_or_else(|| RecmanError::NotFound(format!("record {name}")))?;
        Ok(vec![self.view(record)])
    }

    /// Look up a record whose name contains `name`.
    pub async fn search_records_contains(&self, name: &str) -> Result<Vec<RecordView>> {
        let record = self
            .records
            .find_by_name_contains(name)
            .await?
            .ok_or_else(|| RecmanError::NotFound(format!("record matching {name}")))?;
        Ok(vec![self.view(record)])
    }

    /// Fetch the full content of a stored file.
    pub async fn download(&self, key: &str) -> Result<Bytes> {
        let content = self.blobs.get(key).await.map_err(|e| {
            warn!(key = %key, "Download failed: {}", e);
            RecmanError::from(e)
        })?;
        debug!(key = %key, size = content.len(), "Downloaded file");
        Ok(content)
    }

    /// Delete a stored file and mark its record unavailable.
    pub async fn delete(&self, key: &str, actor: &Actor) -> Result<RecordView> {
        if self.search_exact(key).await?.is_empty() {
            return Err(RecmanError::NotExist(format!("blob {key}")));
        }

        info!(key = %key, user = %actor.name, "Deleting file");
        self.blobs.delete(key).await?;

        if !self.search_exact(key).await?.is_empty() {
            error!(key = %key, "Blob still present after delete");
            return Err(RecmanError::DeletionFailed(format!("{key} is still present")));
        }

        let mut record = self
            .records
            .find_by_exact_name(key)
            .await?
            .ok_or_else(|| RecmanError::NotExist(format!("record {key}")))?;
        record.available = false;
        record.latest_update_date_time = self.clock.now();
        record.updated_by_user = actor.name.clone();

        let saved = self.records.save(&record).await?;
        info!(id = %saved.id, key = %key, "Record marked unavailable");
        Ok(self.view(saved))
    }

    async fn stage(&self, content: &[u8]) -> Result<NamedTempFile> {
        let builder = {
            let mut b = tempfile::Builder::new();
            b.prefix("recman-upload-");
            b
        };
        let staged = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| RecmanError::UploadFailure(format!("failed to create temp file: {e}")))?;

        tokio::fs::write(staged.path(), content)
            .await
            .map_err(|e| RecmanError::UploadFailure(format!("failed to stage upload: {e}")))?;
        Ok(staged)
    }

    /// Walk every listing page, keeping entries whose key matches.
    async fn scan<F>(&self, matches: F) -> Result<Vec<BlobMetadata>>
    where
        F: Fn(&str) -> bool,
    {
        let mut found = Vec::new();
        let mut token = None;
        loop {
            let page = self
                .blobs
                .list(token)
                .await
                .map_err(|e| RecmanError::Unknown(e.to_string()))?;
            found.extend(page.entries.into_iter().filter(|m| matches(&m.key)));

            match page.next_token {
                Some(next) if page.is_truncated => token = Some(next),
                _ => break,
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::record::MemoryRecordStore;
    use crate::storage::{BlobError, ListPage, MemoryBlobStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use std::path::Path;
    use tempfile::TempDir;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 31, 21, 15, 7).unwrap() + Duration::milliseconds(42)
    }

    const REPORT_KEY: &str = "2024_08_31_09_15_07_042_1725138907_report.txt";

    struct Fixture {
        service: RecordService,
        blobs: Arc<MemoryBlobStore>,
        records: Arc<MemoryRecordStore>,
        clock: Arc<FixedClock>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(FixedClock::new(fixed_time()));
        let blobs = Arc::new(
            MemoryBlobStore::new("medical-records")
                .with_page_size(2)
                .with_clock(clock.clone()),
        );
        let records = Arc::new(MemoryRecordStore::new());
        let service = RecordService::new(
            blobs.clone(),
            records.clone(),
            clock.clone(),
            ElapsedFormatter::default(),
        );
        Fixture {
            service,
            blobs,
            records,
            clock,
        }
    }

    fn admin() -> Actor {
        Actor::new("alice", "admin")
    }

    /// Blob store whose writes always fail.
    struct FailingPutStore(MemoryBlobStore);

    #[async_trait]
    impl BlobStore for FailingPutStore {
        fn bucket(&self) -> &str {
            self.0.bucket()
        }
        async fn put(&self, _key: &str, _source: &Path) -> std::result::Result<(), BlobError> {
            Err(BlobError::Backend("HTTP 503".to_string()))
        }
        async fn get(&self, key: &str) -> std::result::Result<Bytes, BlobError> {
            self.0.get(key).await
        }
        async fn list(&self, token: Option<String>) -> std::result::Result<ListPage, BlobError> {
            self.0.list(token).await
        }
        async fn delete(&self, key: &str) -> std::result::Result<(), BlobError> {
            self.0.delete(key).await
        }
    }

    /// Blob store that acknowledges deletes without removing anything.
    struct StickyDeleteStore(MemoryBlobStore);

    #[async_trait]
    impl BlobStore for StickyDeleteStore {
        fn bucket(&self) -> &str {
            self.0.bucket()
        }
        async fn put(&self, key: &str, source: &Path) -> std::result::Result<(), BlobError> {
            self.0.put(key, source).await
        }
        async fn get(&self, key: &str) -> std::result::Result<Bytes, BlobError> {
            self.0.get(key).await
        }
        async fn list(&self, token: Option<String>) -> std::result::Result<ListPage, BlobError> {
            self.0.list(token).await
        }
        async fn delete(&self, _key: &str) -> std::result::Result<(), BlobError> {
            Ok(())
        }
    }

    /// Blob store whose listing always fails.
    struct BrokenListStore(MemoryBlobStore);

    #[async_trait]
    impl BlobStore for BrokenListStore {
        fn bucket(&self) -> &str {
            self.0.bucket()
        }
        async fn put(&self, key: &str, source: &Path) -> std::result::Result<(), BlobError> {
            self.0.put(key, source).await
        }
        async fn get(&self, _key: &str) -> std::result::Result<Bytes, BlobError> {
            Err(BlobError::Read("connection reset".to_string()))
        }
        async fn list(&self, _token: Option<String>) -> std::result::Result<ListPage, BlobError> {
            Err(BlobError::Backend("access denied".to_string()))
        }
        async fn delete(&self, key: &str) -> std::result::Result<(), BlobError> {
            self.0.delete(key).await
        }
    }

    /// Record store whose writes always fail.
    struct FailingSaveRecords;

    #[async_trait]
    impl RecordStore for FailingSaveRecords {
        async fn save(&self, _record: &Record) -> Result<Record> {
            Err(RecmanError::Database("database is locked".to_string()))
        }
        async fn find_by_id(&self, _id: &str) -> Result<Option<Record>> {
            Ok(None)
        }
        async fn find_by_exact_name(&self, _name: &str) -> Result<Option<Record>> {
            Ok(None)
        }
        async fn find_by_name_contains(&self, _fragment: &str) -> Result<Option<Record>> {
            Ok(None)
        }
    }

    fn service_over(blobs: Arc<dyn BlobStore>, records: Arc<MemoryRecordStore>) -> RecordService {
        RecordService::new(
            blobs,
            records,
            Arc::new(FixedClock::new(fixed_time())),
            ElapsedFormatter::default(),
        )
    }

    #[tokio::test]
    async fn test_upload_creates_blob_and_record() {
        let f = fixture();
        let view = f
            .service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();

        let record = &view.record;
        assert_eq!(record.record_name, REPORT_KEY);
        assert_eq!(record.patient_id, "alice");
        assert_eq!(record.updated_by_user, "alice");
        assert_eq!(record.creation_date_time, fixed_time());
        assert_eq!(record.latest_update_date_time, fixed_time());
        assert!(record.available);
        assert!(Uuid::parse_str(&record.id).is_ok());
        assert_eq!(view.elapsed_creation_time, "0 seconds");

        let meta = record.blob_metadata.as_ref().unwrap();
        assert_eq!(meta.bucket_name, "medical-records");
        assert_eq!(meta.key, REPORT_KEY);
        assert_eq!(meta.size, 3);

        assert_eq!(f.blobs.len().await, 1);
        assert_eq!(f.records.len().await, 1);
    }

    #[tokio::test]
    async fn test_upload_uses_explicit_patient_id() {
        let f = fixture();
        let view = f
            .service
            .upload(
                UploadRequest::new("scan.png", &b"png"[..]).with_patient_id("patient-42"),
                &admin(),
            )
            .await
            .unwrap();
        assert_eq!(view.record.patient_id, "patient-42");
        assert_eq!(view.record.updated_by_user, "alice");
    }

    #[tokio::test]
    async fn test_upload_keeps_only_final_path_component() {
        let f = fixture();
        let view = f
            .service
            .upload(UploadRequest::new("../../etc/report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();
        assert_eq!(view.record.record_name, REPORT_KEY);
    }

    #[tokio::test]
    async fn test_upload_empty_name_is_invalid() {
        let f = fixture();
        let result = f
            .service
            .upload(UploadRequest::new("", &b"abc"[..]), &admin())
            .await;
        assert!(matches!(result, Err(RecmanError::InvalidRequest(_))));
        assert!(f.blobs.is_empty().await);
        assert!(f.records.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_write_failure() {
        let records = Arc::new(MemoryRecordStore::new());
        let service = service_over(
            Arc::new(FailingPutStore(MemoryBlobStore::new("bucket"))),
            records.clone(),
        );
        let result = service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await;
        assert!(matches!(result, Err(RecmanError::UploadFailure(_))));
        assert!(records.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_metadata_lookup_failure() {
        let records = Arc::new(MemoryRecordStore::new());
        let service = service_over(
            Arc::new(BrokenListStore(MemoryBlobStore::new("bucket"))),
            records.clone(),
        );
        let result = service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await;
        assert!(matches!(result, Err(RecmanError::UploadFailure(_))));
        assert!(records.is_empty().await);
    }

    #[tokio::test]
    async fn test_upload_record_save_failure() {
        let service = RecordService::new(
            Arc::new(MemoryBlobStore::new("bucket")),
            Arc::new(FailingSaveRecords),
            Arc::new(FixedClock::new(fixed_time())),
            ElapsedFormatter::default(),
        );
        let result = service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await;
        assert!(matches!(result, Err(RecmanError::UploadFailure(msg)) if msg.contains("locked")));
    }

    #[tokio::test]
    async fn test_upload_releases_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let f = fixture();
        let service = f.service.with_temp_dir(temp_dir.path());

        service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);

        let failing = service_over(
            Arc::new(FailingPutStore(MemoryBlobStore::new("bucket"))),
            Arc::new(MemoryRecordStore::new()),
        )
        .with_temp_dir(temp_dir.path());
        assert!(failing
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .is_err());
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_search_walks_all_pages() {
        let f = fixture();
        for (i, name) in ["a.txt", "b.txt", "report.txt", "c.txt", "d.txt"].iter().enumerate() {
            f.clock.set(fixed_time() + Duration::seconds(i as i64));
            f.service
                .upload(UploadRequest::new(*name, &b"x"[..]), &admin())
                .await
                .unwrap();
        }

        let all = f.service.search_contains(".txt").await.unwrap();
        assert_eq!(all.len(), 5);

        let report = f.service.search_contains("report").await.unwrap();
        assert_eq!(report.len(), 1);

        let exact = f.service.search_exact(&report[0].key).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].size, 1);
    }

    #[tokio::test]
    async fn test_search_empty_is_ok() {
        let f = fixture();
        assert!(f.service.search_exact("missing").await.unwrap().is_empty());
        assert!(f.service.search_contains("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_search_backend_fault_is_unknown() {
        let service = service_over(
            Arc::new(BrokenListStore(MemoryBlobStore::new("bucket"))),
            Arc::new(MemoryRecordStore::new()),
        );
        let result = service.search_contains("x").await;
        assert!(matches!(result, Err(RecmanError::Unknown(_))));
    }

    #[tokio::test]
    async fn test_search_records() {
        let f = fixture();
        f.service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();
        f.clock.advance(Duration::seconds(90));

        let exact = f.service.search_records_exact(REPORT_KEY).await.unwrap();
        assert_eq!(exact.len(), 1);
        assert_eq!(exact[0].elapsed_creation_time, "1 minutes");
        assert!(exact[0].record.blob_metadata.is_none());

        let partial = f.service.search_records_contains("report").await.unwrap();
        assert_eq!(partial[0].record.record_name, REPORT_KEY);
    }

    #[tokio::test]
    async fn test_search_records_empty_is_not_found() {
        let f = fixture();
        assert!(matches!(
            f.service.search_records_exact("report.txt").await,
            Err(RecmanError::NotFound(_))
        ));
        assert!(matches!(
            f.service.search_records_contains("report").await,
            Err(RecmanError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_download() {
        let f = fixture();
        f.service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();

        let content = f.service.download(REPORT_KEY).await.unwrap();
        assert_eq!(content, Bytes::from_static(b"abc"));

        assert!(matches!(
            f.service.download("missing.txt").await,
            Err(RecmanError::NotExist(_))
        ));
    }

    #[tokio::test]
    async fn test_download_read_failure_is_io_failure() {
        let service = service_over(
            Arc::new(BrokenListStore(MemoryBlobStore::new("bucket"))),
            Arc::new(MemoryRecordStore::new()),
        );
        assert!(matches!(
            service.download("k").await,
            Err(RecmanError::IoFailure(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_marks_record_unavailable() {
        let f = fixture();
        f.service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();
        f.clock.advance(Duration::hours(2));

        let bob = Actor::new("bob", "admin");
        let view = f.service.delete(REPORT_KEY, &bob).await.unwrap();
        assert!(!view.record.available);
        assert_eq!(view.record.updated_by_user, "bob");
        assert_eq!(
            view.record.latest_update_date_time,
            fixed_time() + Duration::hours(2)
        );
        assert_eq!(view.elapsed_creation_time, "2 hours");
        assert_eq!(view.elapsed_update_time, "0 seconds");

        assert!(f.service.search_exact(REPORT_KEY).await.unwrap().is_empty());
        let stored = f.records.find_by_exact_name(REPORT_KEY).await.unwrap().unwrap();
        assert!(!stored.available);
    }

    #[tokio::test]
    async fn test_delete_absent_key_does_not_touch_records() {
        let f = fixture();
        f.service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();

        let result = f.service.delete("missing.txt", &admin()).await;
        assert!(matches!(result, Err(RecmanError::NotExist(_))));

        let stored = f.records.find_by_exact_name(REPORT_KEY).await.unwrap().unwrap();
        assert!(stored.available);
        assert_eq!(f.blobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_blob_still_present_is_deletion_failed() {
        let records = Arc::new(MemoryRecordStore::new());
        let service = service_over(
            Arc::new(StickyDeleteStore(MemoryBlobStore::new("bucket"))),
            records.clone(),
        );
        service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();

        let result = service.delete(REPORT_KEY, &admin()).await;
        assert!(matches!(result, Err(RecmanError::DeletionFailed(_))));

        let stored = records.find_by_exact_name(REPORT_KEY).await.unwrap().unwrap();
        assert!(stored.available);
    }

    #[tokio::test]
    async fn test_delete_without_record_is_not_exist() {
        let f = fixture();
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), b"orphan").unwrap();
        f.blobs.put("orphan.txt", temp.path()).await.unwrap();

        let result = f.service.delete("orphan.txt", &admin()).await;
        assert!(matches!(result, Err(RecmanError::NotExist(_))));
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let f = fixture();
        let view = f
            .service
            .upload(UploadRequest::new("report.txt", &b"abc"[..]), &admin())
            .await
            .unwrap();
        let key = view.record.record_name.clone();
        assert_eq!(key, REPORT_KEY);

        assert_eq!(f.service.search_contains("report").await.unwrap().len(), 1);
        assert_eq!(
            f.service.download(&key).await.unwrap(),
            Bytes::from_static(b"abc")
        );

        f.service.delete(&key, &admin()).await.unwrap();
        assert!(f.service.search_exact(&key).await.unwrap().is_empty());
    }
}
