//! Web API module for recman.
//!
//! This module provides the REST API for uploading, searching, downloading
//! and deleting record files.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use middleware::JwtState;
pub use router::{create_docs_router, create_health_router, create_router, ApiDoc};
pub use server::WebServer;
