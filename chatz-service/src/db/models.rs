//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline position of a document.
///
/// Declaration order is pipeline order; a document only ever moves one step
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Bytes stored and validated as a PDF
    Uploaded,
    /// Text extracted and chunked
    Extracted,
    /// Every chunk has an embedding
    Embedded,
    /// Queryable
    Ready,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Extracted => "extracted",
            DocumentStatus::Embedded => "embedded",
            DocumentStatus::Ready => "ready",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "uploaded" => Some(DocumentStatus::Uploaded),
            "extracted" => Some(DocumentStatus::Extracted),
            "embedded" => Some(DocumentStatus::Embedded),
            "ready" => Some(DocumentStatus::Ready),
            _ => None,
        }
    }

    /// The only status this one may advance to
    pub fn next(&self) -> Option<Self> {
        match self {
            DocumentStatus::Uploaded => Some(DocumentStatus::Extracted),
            DocumentStatus::Extracted => Some(DocumentStatus::Embedded),
            DocumentStatus::Embedded => Some(DocumentStatus::Ready),
            DocumentStatus::Ready => None,
        }
    }

    /// The status a document must hold to advance to this one
    pub fn previous(&self) -> Option<Self> {
        match self {
            DocumentStatus::Uploaded => None,
            DocumentStatus::Extracted => Some(DocumentStatus::Uploaded),
            DocumentStatus::Embedded => Some(DocumentStatus::Extracted),
            DocumentStatus::Ready => Some(DocumentStatus::Embedded),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry entry for an uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Also the object store key of the PDF bytes
    pub id: String,
    pub file_name: String,
    pub status: DocumentStatus,
    pub file_size: u64,
    pub page_count: u32,
    pub content_hash: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Column list matching `Document::from_row`
pub(crate) const DOCUMENT_COLUMNS: &str = "d.id, d.file_name, d.status, d.file_size, d.page_count, d.content_hash, \
     (SELECT COUNT(*) FROM chunks WHERE document_id = d.id) AS chunk_count, \
     d.created_at, d.updated_at";

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status_str: String = row.get(2)?;
        let file_size: i64 = row.get(3)?;
        let page_count: i64 = row.get(4)?;
        let chunk_count: i64 = row.get(6)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        let status = DocumentStatus::parse(&status_str).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                Type::Text,
                format!("unknown document status '{}'", status_str).into(),
            )
        })?;

        Ok(Self {
            id: row.get(0)?,
            file_name: row.get(1)?,
            status,
            file_size: file_size as u64,
            page_count: page_count as u32,
            content_hash: row.get(5)?,
            chunk_count: chunk_count as usize,
            created_at: parse_timestamp(7, &created_at_str)?,
            updated_at: parse_timestamp(8, &updated_at_str)?,
        })
    }
}

/// Extracted text chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i32,
    pub page_number: Option<i32>,
    pub content: String,
}

impl Chunk {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get(0)?,
            document_id: row.get(1)?,
            chunk_index: row.get(2)?,
            page_number: row.get(3)?,
            content: row.get(4)?,
        })
    }
}

fn parse_timestamp(column: usize, s: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}
