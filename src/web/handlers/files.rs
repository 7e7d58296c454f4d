//! File handlers for Web API.

use axum::{
    body::Body,
    extract::{Multipart, Path, Query, State},
    http::header,
    response::Response,
    Json,
};
use bytes::Bytes;
use std::sync::Arc;

use crate::record::UploadRequest;
use crate::web::dto::{
    ApiResponse, BlobMetadataResponse, RecordResponse, SearchMode, SearchQuery,
};
use crate::web::error::ApiError;
use crate::web::handlers::AppState;
use crate::web::middleware::AuthUser;

/// Generate a safe Content-Disposition header value for file downloads.
///
/// Control characters are removed, quotes and backslashes are replaced in the
/// plain `filename` parameter, and non-ASCII names are also sent as an RFC 5987
/// `filename*` parameter.
pub(crate) fn content_disposition_header(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '"' | '\\' => '_',
            _ => c,
        })
        .collect();

    if filename.is_ascii() && sanitized == filename {
        return format!("attachment; filename=\"{}\"", filename);
    }

    let encoded = urlencoding::encode(filename);
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        sanitized, encoded
    )
}

/// POST /files/upload - Upload a file.
///
/// Request body: multipart/form-data with "file" and optional "patient_id" fields.
#[utoipa::path(
    post,
    path = "/files/upload",
    tag = "files",
    responses(
        (status = 200, description = "File uploaded", body = RecordResponse),
        (status = 400, description = "Invalid multipart data, missing file or file too large"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 500, description = "Upload failed")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<RecordResponse>>, ApiError> {
    let actor = auth.require_admin()?;

    let mut filename: Option<String> = None;
    let mut content: Option<Bytes> = None;
    let mut patient_id: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Failed to read multipart field: {}", e);
        ApiError::bad_request("Current request is not a valid multipart request")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" => {
                filename = field.file_name().map(|s| s.to_string());
                content = Some(field.bytes().await.map_err(|e| {
                    tracing::warn!("Failed to read file content: {}", e);
                    ApiError::bad_request("Failed to read file")
                })?);
            }
            "patient_id" => {
                patient_id = Some(field.text().await.map_err(|e| {
                    tracing::warn!("Failed to read patient_id: {}", e);
                    ApiError::bad_request("Invalid patient_id")
                })?);
            }
            _ => {}
        }
    }

    let filename = filename.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let content = content.ok_or_else(|| ApiError::bad_request("No file content"))?;

    if content.len() as u64 > state.max_upload_size {
        let max_mb = state.max_upload_size / 1024 / 1024;
        return Err(ApiError::bad_request(format!(
            "File too large (max {}MB)",
            max_mb
        )));
    }

    let mut request = UploadRequest::new(filename, content);
    if let Some(patient_id) = patient_id {
        request = request.with_patient_id(patient_id);
    }

    let view = state.service.upload(request, &actor).await?;
    Ok(Json(ApiResponse::new(view.into())))
}

/// GET /files/search/:word - Search stored objects by key.
#[utoipa::path(
    get,
    path = "/files/search/{word}",
    tag = "files",
    params(
        ("word" = String, Path, description = "Search word"),
        SearchQuery
    ),
    responses(
        (status = 200, description = "Matching objects (may be empty)", body = [BlobMetadataResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Storage error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn search_files(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(word): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<BlobMetadataResponse>>>, ApiError> {
    let found = match query.mode_or(SearchMode::Contains) {
        SearchMode::Exact => state.service.search_exact(&word).await?,
        SearchMode::Contains => state.service.search_contains(&word).await?,
    };

    let response: Vec<BlobMetadataResponse> = found.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::new(response)))
}

/// GET /files/records/:word - Search records by name.
#[utoipa::path(
    get,
    path = "/files/records/{word}",
    tag = "files",
    params(
        ("word" = String, Path, description = "Record name or fragment"),
        SearchQuery
    ),
    responses(
        (status = 200, description = "Matching records", body = [RecordResponse]),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No matching record")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn search_records(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(word): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<RecordResponse>>>, ApiError> {
    let views = match query.mode_or(SearchMode::Exact) {
        SearchMode::Exact => state.service.search_records_exact(&word).await?,
        SearchMode::Contains => state.service.search_records_contains(&word).await?,
    };

    let response: Vec<RecordResponse> = views.into_iter().map(Into::into).collect();
    Ok(Json(ApiResponse::new(response)))
}

/// GET /files/download/:name - Download a file.
#[utoipa::path(
    get,
    path = "/files/download/{name}",
    tag = "files",
    params(
        ("name" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "File content", content_type = "application/octet-stream"),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "File not found"),
        (status = 500, description = "Storage error")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    AuthUser(_claims): AuthUser,
    Path(name): Path<String>,
) -> Result<Response<Body>, ApiError> {
    let content = state.service.download(&name).await?;

    let response = Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_DISPOSITION, content_disposition_header(&name))
        .header(header::CONTENT_LENGTH, content.len())
        .body(Body::from(content))
        .map_err(|e| {
            tracing::error!("Failed to build response: {}", e);
            ApiError::internal("Failed to build response")
        })?;

    Ok(response)
}

/// DELETE /files/delete/:name - Delete a file.
#[utoipa::path(
    delete,
    path = "/files/delete/{name}",
    tag = "files",
    params(
        ("name" = String, Path, description = "Object key")
    ),
    responses(
        (status = 200, description = "File deleted, record marked unavailable", body = RecordResponse),
        (status = 400, description = "File still present after delete"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Admin role required"),
        (status = 404, description = "File not found")
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<RecordResponse>>, ApiError> {
    let actor = auth.require_admin()?;
    let view = state.service.delete(&name, &actor).await?;
    Ok(Json(ApiResponse::new(view.into())))
}
