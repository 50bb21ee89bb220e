use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::DocumentStatus;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{message}")]
    Validation {
        kind: ValidationKind,
        message: String,
    },

    #[error("A document named '{file_name}' already exists")]
    Conflict { file_name: String },

    #[error("Document {document_id} is {actual}, expected {expected}")]
    InvalidTransition {
        document_id: String,
        expected: DocumentStatus,
        actual: DocumentStatus,
    },

    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("Storage error")]
    Storage(#[from] StorageError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("{0}")]
    Ollama(#[from] OllamaError),

    #[error("Embedding error")]
    Embedding(#[from] EmbeddingError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Background task failed")]
    Task(#[from] tokio::task::JoinError),
}

/// What was wrong with a user-supplied input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    EmptyName,
    EmptyFile,
    FileTooLarge,
    InvalidPdf,
    EncryptedPdf,
    NoText,
    EmptyQuestion,
    /// Malformed request body
    InvalidRequest,
}

impl ValidationKind {
    pub fn code(&self) -> &'static str {
        match self {
            ValidationKind::EmptyName => "empty_name",
            ValidationKind::EmptyFile => "empty_file",
            ValidationKind::FileTooLarge => "file_too_large",
            ValidationKind::InvalidPdf => "invalid_pdf",
            ValidationKind::EncryptedPdf => "encrypted_pdf",
            ValidationKind::NoText => "no_text",
            ValidationKind::EmptyQuestion => "empty_question",
            ValidationKind::InvalidRequest => "invalid_request",
        }
    }
}

/// Object store errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Blob not found: {id}")]
    BlobNotFound { id: String },

    #[error("Invalid blob id: {id}")]
    InvalidId { id: String },

    #[error("Blob IO failed")]
    Io(#[source] std::io::Error),
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// PDF inspection and text extraction errors
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("Invalid PDF or corrupted file: {reason}")]
    Corrupted { reason: String },

    #[error("Encrypted PDFs are not supported")]
    Encrypted,

    #[error("PDF has no pages")]
    NoPages,

    #[error("No text could be extracted from the PDF")]
    NoText,
}

/// Ollama client errors
#[derive(Error, Debug)]
pub enum OllamaError {
    #[error("Connection failed to Ollama at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model not found: {model}")]
    ModelNotFound { model: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from Ollama: {message}")]
    InvalidResponse { message: String },
}

/// Embedding errors
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding backend initialization failed: {message}")]
    Init { message: String },

    #[error("Embedding has {actual} dimensions, index uses {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl From<PdfError> for ServiceError {
    fn from(error: PdfError) -> Self {
        let kind = match error {
            PdfError::Corrupted { .. } | PdfError::NoPages => ValidationKind::InvalidPdf,
            PdfError::Encrypted => ValidationKind::EncryptedPdf,
            PdfError::NoText => ValidationKind::NoText,
        };
        ServiceError::Validation {
            kind,
            message: error.to_string(),
        }
    }
}

impl ServiceError {
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        ServiceError::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation {
                kind: ValidationKind::FileTooLarge,
                ..
            } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Validation { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Conflict { .. } | ServiceError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            ServiceError::DocumentNotFound { .. }
            | ServiceError::Storage(StorageError::BlobNotFound { .. }) => StatusCode::NOT_FOUND,
            ServiceError::Ollama(_) | ServiceError::Embedding(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation { kind, .. } => kind.code(),
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::InvalidTransition { .. } => "invalid_transition",
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::Storage(StorageError::BlobNotFound { .. }) => "blob_not_found",
            ServiceError::Storage(_) => "storage_error",
            ServiceError::Database(_) => "database_error",
            ServiceError::Ollama(OllamaError::Connection { .. }) => "ollama_connection",
            ServiceError::Ollama(OllamaError::ModelNotFound { .. }) => "ollama_model_not_found",
            ServiceError::Ollama(OllamaError::Generation { .. }) => "ollama_generation",
            ServiceError::Ollama(OllamaError::InvalidResponse { .. }) => "ollama_invalid_response",
            ServiceError::Embedding(_) => "embedding_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Task(_) => "task_failed",
        }
    }
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    pub code: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %format_error_chain(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: self.error_code().to_string(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as `outer: inner: root`.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut out = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
