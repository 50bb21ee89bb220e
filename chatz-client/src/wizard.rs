//! Stage gating for the step-by-step client.
//!
//! The rules here only steer the user; the server re-checks every stage and
//! answers 409 when a document is not where the client thought it was.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ClientError, ClientResult};
use crate::session::ClientSession;

/// Server-side pipeline position of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Extracted,
    Embedded,
    Ready,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Extracted => "extracted",
            DocumentStatus::Embedded => "embedded",
            DocumentStatus::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// A step the user can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Extract,
    Embed,
    Ready,
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Upload => "upload",
            Stage::Extract => "extract",
            Stage::Embed => "embed",
            Stage::Ready => "ready",
            Stage::Query => "query",
        };
        f.write_str(s)
    }
}

/// The stage that moves a document on from `status`
pub fn next_stage(status: DocumentStatus) -> Stage {
    match status {
        DocumentStatus::Uploaded => Stage::Extract,
        DocumentStatus::Extracted => Stage::Embed,
        DocumentStatus::Embedded => Stage::Ready,
        DocumentStatus::Ready => Stage::Query,
    }
}

/// Stages reachable from the current session. Once a document is selected
/// only its next stage is; `reset` clears the session to upload another.
pub fn allowed_stages(session: &ClientSession) -> Vec<Stage> {
    match session.document() {
        None => vec![Stage::Upload],
        Some((_, status)) => vec![next_stage(status)],
    }
}

/// Fail with `ClientError::Gated` unless `stage` is reachable
pub fn check(session: &ClientSession, stage: Stage) -> ClientResult<()> {
    if allowed_stages(session).contains(&stage) {
        return Ok(());
    }

    let reason = match session.document() {
        None => "upload a PDF first".to_string(),
        Some(_) if stage == Stage::Upload => {
            "a document is already selected, run `reset` to start over".to_string()
        }
        Some((_, DocumentStatus::Ready)) => {
            "the document is ready, only questions can be asked".to_string()
        }
        Some((_, status)) => format!(
            "the document is {}, run `{}` next",
            status,
            next_stage(status)
        ),
    };

    Err(ClientError::Gated { stage, reason })
}
