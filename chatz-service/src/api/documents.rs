//! Document API endpoints.
//!
//! Upload, listing and lookup. Uploads are multipart with a `file` part and
//! an optional `name` part overriding the part's file name.

use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;

use crate::db::{Document, DocumentStatus};
use crate::error::{ServiceError, ValidationKind};

use super::AppState;

/// Response for an upload
#[derive(Serialize)]
pub struct UploadResponse {
    pub id: String,
    pub name: String,
    pub status: DocumentStatus,
    pub deduplicated: bool,
    pub page_count: u32,
    pub file_size: u64,
}

/// Upload a new document
pub async fn upload_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ServiceError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut name_override: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                file = Some((file_name, data));
            }
            "name" => {
                let name = field.text().await.map_err(multipart_error)?;
                if !name.trim().is_empty() {
                    name_override = Some(name);
                }
            }
            _ => {}
        }
    }

    let (file_name, data) = file.ok_or_else(|| {
        ServiceError::validation(ValidationKind::InvalidRequest, "Missing 'file' field")
    })?;
    let name = name_override.unwrap_or(file_name);

    let outcome = state.service.upload(&name, data).await?;
    let document = outcome.document;

    Ok(Json(UploadResponse {
        id: document.id,
        name: document.file_name,
        status: document.status,
        deduplicated: outcome.deduplicated,
        page_count: document.page_count,
        file_size: document.file_size,
    }))
}

/// List all documents
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    let documents = state.service.list_documents()?;
    Ok(Json(documents))
}

/// Get a single document
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Document>, ServiceError> {
    let document = state.service.get_document(&id)?;
    Ok(Json(document))
}

fn multipart_error(error: MultipartError) -> ServiceError {
    let kind = if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidationKind::FileTooLarge
    } else {
        ValidationKind::InvalidRequest
    };
    ServiceError::validation(kind, error.body_text())
}
