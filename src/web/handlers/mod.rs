//! API handlers for the record management service.

pub mod files;

pub use files::*;

use std::sync::Arc;

use crate::record::RecordService;

/// Shared application state for the handlers.
pub struct AppState {
    /// Record lifecycle service.
    pub service: Arc<RecordService>,
    /// Maximum upload size in bytes.
    pub max_upload_size: u64,
}

impl AppState {
    /// Create a new application state.
    pub fn new(service: Arc<RecordService>, max_upload_size: u64) -> Self {
        Self {
            service,
            max_upload_size,
        }
    }
}
