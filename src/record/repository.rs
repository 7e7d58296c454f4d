//! Record store for recman.
//!
//! This module provides persistence for records. When several records match a
//! name lookup, the earliest-created one is returned.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::sync::RwLock;

use super::Record;
use crate::{RecmanError, Result};

const RECORD_COLUMNS: &str = "id, record_name, patient_id, creation_date_time, \
     latest_update_date_time, available, updated_by_user";

/// Record persistence capability.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record, or update it if a record with the same id exists.
    async fn save(&self, record: &Record) -> Result<Record>;

    /// Get a record by ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<Record>>;

    /// Get the record whose name equals `name`.
    async fn find_by_exact_name(&self, name: &str) -> Result<Option<Record>>;

    /// Get a record whose name contains `fragment`.
    async fn find_by_name_contains(&self, fragment: &str) -> Result<Option<Record>>;
}

/// SQLite-backed record store.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new SqliteRecordStore over the given pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn find_one(&self, filter: &str, value: &str) -> Result<Option<Record>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE {filter}
             ORDER BY creation_date_time ASC, rowid ASC LIMIT 1"
        );
        let result = sqlx::query_as::<_, Record>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RecmanError::Database(e.to_string()))?;

        Ok(result)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &Record) -> Result<Record> {
        sqlx::query(
            "INSERT INTO records (id, record_name, patient_id, creation_date_time,
                                  latest_update_date_time, available, updated_by_user)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                record_name = excluded.record_name,
                patient_id = excluded.patient_id,
                creation_date_time = excluded.creation_date_time,
                latest_update_date_time = excluded.latest_update_date_time,
                available = excluded.available,
                updated_by_user = excluded.updated_by_user",
        )
        .bind(&record.id)
        .bind(&record.record_name)
        .bind(&record.patient_id)
        .bind(record.creation_date_time)
        .bind(record.latest_update_date_time)
        .bind(record.available)
        .bind(&record.updated_by_user)
        .execute(&self.pool)
        .await
        .map_err(|e| RecmanError::Database(e.to_string()))?;

        let mut saved = self
            .find_by_id(&record.id)
            .await?
            .ok_or_else(|| RecmanError::NotFound(format!("record {}", record.id)))?;
        saved.blob_metadata = record.blob_metadata.clone();
        Ok(saved)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        self.find_one("id = ?", id).await
    }

    async fn find_by_exact_name(&self, name: &str) -> Result<Option<Record>> {
        self.find_one("record_name = ?", name).await
    }

    async fn find_by_name_contains(&self, fragment: &str) -> Result<Option<Record>> {
        // instr treats the fragment literally, unlike LIKE.
        self.find_one("instr(record_name, ?) > 0", fragment).await
    }
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<Vec<Record>>,
}

impl MemoryRecordStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    async fn find_first<F>(&self, predicate: F) -> Option<Record>
    where
        F: Fn(&Record) -> bool,
    {
        self.records
            .read()
            .await
            .iter()
            .filter(|r| predicate(r))
            .min_by_key(|r| r.creation_date_time)
            .map(|r| Record {
                blob_metadata: None,
                ..r.clone()
            })
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &Record) -> Result<Record> {
        let stored = Record {
            blob_metadata: None,
            ..record.clone()
        };

        let mut records = self.records.write().await;
        match records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = stored,
            None => records.push(stored),
        }
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Record>> {
        Ok(self.find_first(|r| r.id == id).await)
    }

    async fn find_by_exact_name(&self, name: &str) -> Result<Option<Record>> {
        Ok(self.find_first(|r| r.record_name == name).await)
    }

    async fn find_by_name_contains(&self, fragment: &str) -> Result<Option<Record>> {
        Ok(self.find_first(|r| r.record_name.contains(fragment)).await)
    }
}
