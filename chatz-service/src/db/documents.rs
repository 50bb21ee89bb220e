//! Document registry operations.
//!
//! Insert, lookup by id or file name, listing, and the compare-and-swap
//! status transition every pipeline stage commits through.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Transaction, params};
use tracing::debug;

use super::Database;
use super::models::{DOCUMENT_COLUMNS, Document, DocumentStatus};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

impl Database {
    /// Insert a new document.
    ///
    /// The `UNIQUE` constraint on `file_name` is the arbiter between
    /// concurrent uploads of the same name: the loser gets
    /// `ServiceError::Conflict`.
    pub fn insert_document(&self, doc: &Document) -> ServiceResult<()> {
        let conn = self.conn();

        conn.execute(
            r#"
            INSERT INTO documents (id, file_name, status, file_size, page_count, content_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                doc.id,
                doc.file_name,
                doc.status.as_str(),
                doc.file_size as i64,
                doc.page_count as i64,
                doc.content_hash,
                doc.created_at.to_rfc3339(),
                doc.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict {
                    file_name: doc.file_name.clone(),
                }
            } else {
                ServiceError::Database(DatabaseError::Query(e))
            }
        })?;

        Ok(())
    }

    /// Get a document by ID
    pub fn get_document(&self, id: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn();
        select_document(&conn, id)
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Exact-match lookup by file name
    pub fn find_document_by_name(&self, file_name: &str) -> ServiceResult<Option<Document>> {
        let conn = self.conn();

        conn.query_row(
            &format!(
                "SELECT {} FROM documents d WHERE d.file_name = ?1",
                DOCUMENT_COLUMNS
            ),
            params![file_name],
            Document::from_row,
        )
        .optional()
        .map_err(DatabaseError::Query)
        .map_err(Into::into)
    }

    /// List all documents, oldest first
    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        let conn = self.conn();

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM documents d ORDER BY d.created_at, d.file_name",
                DOCUMENT_COLUMNS
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map([], Document::from_row)
            .map_err(DatabaseError::Query)?;

        let mut docs = Vec::new();
        for row in rows {
            docs.push(row.map_err(DatabaseError::Query)?);
        }

        Ok(docs)
    }

    /// Move a document from `from` to `to`.
    ///
    /// Fails with `InvalidTransition` unless the document currently holds
    /// `from` and `to` is its direct successor.
    pub fn advance_status(
        &self,
        id: &str,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> ServiceResult<Document> {
        self.advance_status_with(id, from, to, |_| Ok(()))
    }

    /// Like `advance_status`, but runs `work` in the same transaction.
    ///
    /// `work` only runs once the status check has passed, and its writes are
    /// rolled back if it fails, so stage artifacts and status never diverge.
    pub fn advance_status_with<F>(
        &self,
        id: &str,
        from: DocumentStatus,
        to: DocumentStatus,
        work: F,
    ) -> ServiceResult<Document>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<()>,
    {
        let mut conn = self.conn();

        if from.next() != Some(to) {
            let actual = select_status(&conn, id)
                .map_err(DatabaseError::Query)?
                .ok_or_else(|| ServiceError::DocumentNotFound {
                    document_id: id.to_string(),
                })?;
            return Err(ServiceError::InvalidTransition {
                document_id: id.to_string(),
                expected: to.previous().unwrap_or(from),
                actual,
            });
        }

        let tx = conn.transaction().map_err(DatabaseError::Query)?;

        let rows = tx
            .execute(
                "UPDATE documents SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
                params![to.as_str(), Utc::now().to_rfc3339(), id, from.as_str()],
            )
            .map_err(DatabaseError::Query)?;

        if rows == 0 {
            // Dropping the transaction rolls it back
            let actual = select_status(&tx, id).map_err(DatabaseError::Query)?;
            return Err(match actual {
                None => ServiceError::DocumentNotFound {
                    document_id: id.to_string(),
                },
                Some(actual) => ServiceError::InvalidTransition {
                    document_id: id.to_string(),
                    expected: from,
                    actual,
                },
            });
        }

        work(&tx).map_err(DatabaseError::Query)?;
        tx.commit().map_err(DatabaseError::Query)?;

        debug!(doc_id = %id, from = %from, to = %to, "Document status advanced");

        select_document(&conn, id)
            .map_err(DatabaseError::Query)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: id.to_string(),
            })
    }
}

fn select_document(conn: &Connection, id: &str) -> rusqlite::Result<Option<Document>> {
    conn.query_row(
        &format!("SELECT {} FROM documents d WHERE d.id = ?1", DOCUMENT_COLUMNS),
        params![id],
        Document::from_row,
    )
    .optional()
}

fn select_status(conn: &Connection, id: &str) -> rusqlite::Result<Option<DocumentStatus>> {
    let status: Option<String> = conn
        .query_row(
            "SELECT status FROM documents WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;

    Ok(status.and_then(|s| DocumentStatus::parse(&s)))
}

fn is_unique_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(id: &str, file_name: &str) -> Document {
        let now = Utc::now();
        Document {
            id: id.to_string(),
            file_name: file_name.to_string(),
            status: DocumentStatus::Uploaded,
            file_size: 1024,
            page_count: 3,
            content_hash: "abc123".to_string(),
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "report.pdf")).unwrap();

        let by_id = db.get_document("doc-1").unwrap().unwrap();
        assert_eq!(by_id.file_name, "report.pdf");
        assert_eq!(by_id.status, DocumentStatus::Uploaded);
        assert_eq!(by_id.page_count, 3);
        assert_eq!(by_id.file_size, 1024);

        let by_name = db.find_document_by_name("report.pdf").unwrap().unwrap();
        assert_eq!(by_name.id, "doc-1");

        assert!(db.find_document_by_name("Report.pdf").unwrap().is_none());
        assert!(db.get_document("missing").unwrap().is_none());
    }

    #[test]
    fn test_corrupt_timestamp_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "report.pdf")).unwrap();
        db.conn()
            .execute(
                "UPDATE documents SET created_at = 'yesterday-ish' WHERE id = 'doc-1'",
                [],
            )
            .unwrap();

        assert!(matches!(
            db.get_document("doc-1"),
            Err(ServiceError::Database(DatabaseError::Query(
                rusqlite::Error::FromSqlConversionFailure(7, _, _)
            )))
        ));
        assert!(db.list_documents().is_err());
    }

    #[test]
    fn test_duplicate_name_is_conflict() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "report.pdf")).unwrap();

        let err = db
            .insert_document(&document("doc-2", "report.pdf"))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict { ref file_name } if file_name == "report.pdf"));
        assert_eq!(db.list_documents().unwrap().len(), 1);
    }

    #[test]
    fn test_advance_follows_pipeline_order() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        let doc = db
            .advance_status("doc-1", DocumentStatus::Uploaded, DocumentStatus::Extracted)
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Extracted);

        let doc = db
            .advance_status("doc-1", DocumentStatus::Extracted, DocumentStatus::Embedded)
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Embedded);

        let doc = db
            .advance_status("doc-1", DocumentStatus::Embedded, DocumentStatus::Ready)
            .unwrap();
        assert_eq!(doc.status, DocumentStatus::Ready);
    }

    #[test]
    fn test_advance_from_wrong_status_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        let err = db
            .advance_status("doc-1", DocumentStatus::Extracted, DocumentStatus::Embedded)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition {
                expected: DocumentStatus::Extracted,
                actual: DocumentStatus::Uploaded,
                ..
            }
        ));
        assert_eq!(
            db.get_document("doc-1").unwrap().unwrap().status,
            DocumentStatus::Uploaded
        );
    }

    #[test]
    fn test_repeated_advance_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        db.advance_status("doc-1", DocumentStatus::Uploaded, DocumentStatus::Extracted)
            .unwrap();
        let err = db
            .advance_status("doc-1", DocumentStatus::Uploaded, DocumentStatus::Extracted)
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::InvalidTransition {
                actual: DocumentStatus::Extracted,
                ..
            }
        ));
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        let err = db
            .advance_status("doc-1", DocumentStatus::Uploaded, DocumentStatus::Ready)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        let err = db
            .advance_status("doc-1", DocumentStatus::Extracted, DocumentStatus::Uploaded)
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));

        assert_eq!(
            db.get_document("doc-1").unwrap().unwrap().status,
            DocumentStatus::Uploaded
        );
    }

    #[test]
    fn test_advance_unknown_document() {
        let db = Database::open_in_memory().unwrap();
        let err = db
            .advance_status("nope", DocumentStatus::Uploaded, DocumentStatus::Extracted)
            .unwrap_err();
        assert!(matches!(err, ServiceError::DocumentNotFound { .. }));
    }

    #[test]
    fn test_failed_work_rolls_back_status() {
        let db = Database::open_in_memory().unwrap();
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        let err = db
            .advance_status_with(
                "doc-1",
                DocumentStatus::Uploaded,
                DocumentStatus::Extracted,
                |tx| {
                    tx.execute(
                        "INSERT INTO chunks (id, document_id, chunk_index, page_number, content) VALUES ('c1', 'doc-1', 0, 1, 'text')",
                        [],
                    )?;
                    Err(rusqlite::Error::QueryReturnedNoRows)
                },
            )
            .unwrap_err();
        assert!(matches!(err, ServiceError::Database(_)));

        let doc = db.get_document("doc-1").unwrap().unwrap();
        assert_eq!(doc.status, DocumentStatus::Uploaded);
        assert_eq!(doc.chunk_count, 0);
    }

    #[test]
    fn test_concurrent_advance_has_one_winner() {
        let db = std::sync::Arc::new(Database::open_in_memory().unwrap());
        db.insert_document(&document("doc-1", "a.pdf")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    db.advance_status(
                        "doc-1",
                        DocumentStatus::Uploaded,
                        DocumentStatus::Extracted,
                    )
                    .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
