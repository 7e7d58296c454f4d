//! Record management for recman.
//!
//! A record tracks one uploaded blob: who it belongs to, who touched it last
//! and whether the blob is still available in the store. This module provides:
//! - Record model and response view
//! - Record store capability with SQLite and in-memory implementations
//! - Blob key generation
//! - The record lifecycle service

mod key;
mod repository;
mod service;

pub use key::{generate_key, original_file_name};
pub use repository::{MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use service::RecordService;

use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::storage::BlobMetadata;

/// Role name that may upload and delete files.
pub const ADMIN_ROLE: &str = "admin";

/// Record metadata as stored in the record store.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Record {
    /// Unique record ID.
    pub id: String,
    /// Display name; equal to the blob key.
    pub record_name: String,
    /// Owning subject.
    pub patient_id: String,
    /// When the record was created.
    pub creation_date_time: DateTime<Utc>,
    /// When the record was last modified.
    pub latest_update_date_time: DateTime<Utc>,
    /// True while the blob exists in the store.
    pub available: bool,
    /// Last modifying user.
    pub updated_by_user: String,
    /// Blob metadata snapshot, attached for responses only.
    #[sqlx(skip)]
    pub blob_metadata: Option<BlobMetadata>,
}

/// A record with elapsed-time strings computed at response time.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    /// The record.
    pub record: Record,
    /// Time since creation, e.g. "5 minutes".
    pub elapsed_creation_time: String,
    /// Time since the last update.
    pub elapsed_update_time: String,
}

/// The authenticated subject performing an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// User identifier.
    pub name: String,
    /// Role name.
    pub role: String,
}

impl Actor {
    /// Create a new actor.
    pub fn new(name: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }

    /// Check if this actor may modify files.
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case(ADMIN_ROLE)
    }
}

/// Inbound upload payload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Filename as sent by the client.
    pub original_name: String,
    /// File content.
    pub content: Bytes,
    /// Owning subject; defaults to the uploading actor.
    pub patient_id: Option<String>,
}

impl UploadRequest {
    /// Create an upload request without an explicit owner.
    pub fn new(original_name: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            content: content.into(),
            patient_id: None,
        }
    }

    /// Set the owning subject.
    pub fn with_patient_id(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }
}
