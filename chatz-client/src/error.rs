use std::path::PathBuf;

use thiserror::Error;

use crate::wizard::Stage;

/// Client error type
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with an error body
    #[error("Server rejected the request ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("{stage} is not available: {reason}")]
    Gated { stage: Stage, reason: String },

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session file {path} is invalid")]
    Session {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// Server-side status conflict, the pipeline moved on without us
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Api { status: 409, .. })
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

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
