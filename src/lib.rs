//! recman - Record Management Service
//!
//! Stores uploaded files in S3-compatible object storage and tracks them as
//! records in a SQLite database, behind a JWT-protected HTTP API.

pub mod clock;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod logging;
pub mod record;
pub mod storage;
pub mod web;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Config;
pub use datetime::ElapsedFormatter;
pub use db::Database;
pub use error::{RecmanError, Result};
pub use record::{
    Actor, MemoryRecordStore, Record, RecordService, RecordStore, RecordView, SqliteRecordStore,
    UploadRequest,
};
pub use storage::{open_blob_store, BlobError, BlobMetadata, BlobStore, ListPage};
