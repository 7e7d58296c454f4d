//! Response DTOs for Web API.

use serde::Serialize;
use utoipa::ToSchema;

use crate::record::RecordView;
use crate::storage::{BlobMetadata, BlobOwner};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Owner of a stored object.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlobOwnerResponse {
    /// Canonical owner ID.
    pub id: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl From<BlobOwner> for BlobOwnerResponse {
    fn from(owner: BlobOwner) -> Self {
        Self {
            id: owner.id,
            display_name: owner.display_name,
        }
    }
}

/// Stored object metadata.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BlobMetadataResponse {
    /// Bucket name.
    pub bucket_name: String,
    /// Object key.
    pub key: String,
    /// Content tag.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time (RFC 3339).
    pub last_modified: String,
    /// Storage class.
    pub storage_class: String,
    /// Owner, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<BlobOwnerResponse>,
}

impl From<BlobMetadata> for BlobMetadataResponse {
    fn from(meta: BlobMetadata) -> Self {
        Self {
            bucket_name: meta.bucket_name,
            key: meta.key,
            etag: meta.etag,
            size: meta.size,
            last_modified: meta.last_modified.to_rfc3339(),
            storage_class: meta.storage_class,
            owner: meta.owner.map(Into::into),
        }
    }
}

/// Record with elapsed-time strings.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordResponse {
    /// Record ID.
    pub id: String,
    /// Record name (object key).
    pub record_name: String,
    /// Owning patient.
    pub patient_id: String,
    /// Creation time (RFC 3339).
    pub creation_date_time: String,
    /// Last update time (RFC 3339).
    pub latest_update_date_time: String,
    /// Whether the object is still stored.
    pub available: bool,
    /// Last modifying user.
    pub updated_by_user: String,
    /// Time since creation.
    pub elapsed_creation_time: String,
    /// Time since the last update.
    pub elapsed_update_time: String,
    /// Object metadata, present on upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_metadata: Option<BlobMetadataResponse>,
}

impl From<RecordView> for RecordResponse {
    fn from(view: RecordView) -> Self {
        let record = view.record;
        Self {
            id: record.id,
            record_name: record.record_name,
            patient_id: record.patient_id,
            creation_date_time: record.creation_date_time.to_rfc3339(),
            latest_update_date_time: record.latest_update_date_time.to_rfc3339(),
            available: record.available,
            updated_by_user: record.updated_by_user,
            elapsed_creation_time: view.elapsed_creation_time,
            elapsed_update_time: view.elapsed_update_time,
            blob_metadata: record.blob_metadata.map(Into::into),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_record_response_serialization() {
        let at = Utc.with_ymd_and_hms(2024, 8, 31, 9, 15, 0).unwrap();
        let view = RecordView {
            record: Record {
                id: "r1".to_string(),
                record_name: "report.txt".to_string(),
                patient_id: "p1".to_string(),
                creation_date_time: at,
                latest_update_date_time: at,
                available: true,
                updated_by_user: "alice".to_string(),
                blob_metadata: None,
            },
            elapsed_creation_time: "5 minutes".to_string(),
            elapsed_update_time: "5 minutes".to_string(),
        };

        let json = serde_json::to_value(RecordResponse::from(view)).unwrap();
        assert_eq!(json["record_name"], "report.txt");
        assert_eq!(json["creation_date_time"], "2024-08-31T09:15:00+00:00");
        assert_eq!(json["elapsed_creation_time"], "5 minutes");
        assert_eq!(json["available"], true);
        assert!(json.get("blob_metadata").is_none());
    }

    #[test]
    fn test_blob_metadata_response_owner() {
        let meta = BlobMetadata {
            bucket_name: "b".to_string(),
            key: "k".to_string(),
            etag: "\"e\"".to_string(),
            size: 3,
            last_modified: Utc.with_ymd_and_hms(2024, 8, 31, 0, 0, 0).unwrap(),
            storage_class: "STANDARD".to_string(),
            owner: Some(BlobOwner {
                id: "owner-1".to_string(),
                display_name: None,
            }),
        };

        let json = serde_json::to_value(BlobMetadataResponse::from(meta)).unwrap();
        assert_eq!(json["size"], 3);
        assert_eq!(json["owner"]["id"], "owner-1");
        assert!(json["owner"].get("display_name").is_none());
    }
}
