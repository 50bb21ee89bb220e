//! Chunk storage and embedding search.
//!
//! Chunks and embeddings are only ever written from inside a status
//! transition (`Database::advance_status_with`), so the writers take the
//! transaction rather than locking the connection themselves.

use rusqlite::{Connection, params};

use super::Database;
use super::models::Chunk;
use crate::error::{DatabaseError, EmbeddingError, ServiceResult};

impl Database {
    /// Insert chunks within an open transaction
    pub fn insert_chunks(conn: &Connection, chunks: &[Chunk]) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare(
            r#"
            INSERT INTO chunks (id, document_id, chunk_index, page_number, content)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )?;

        for chunk in chunks {
            stmt.execute(params![
                chunk.id,
                chunk.document_id,
                chunk.chunk_index,
                chunk.page_number,
                chunk.content,
            ])?;
        }

        Ok(())
    }

    /// Insert chunk embeddings within an open transaction
    pub fn insert_embeddings(
        conn: &Connection,
        embeddings: &[(String, Vec<f32>)],
    ) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare(
            "INSERT OR REPLACE INTO chunk_embeddings (chunk_id, embedding) VALUES (?1, ?2)",
        )?;

        for (chunk_id, embedding) in embeddings {
            // Convert f32 slice to bytes
            let embedding_bytes: Vec<u8> =
                embedding.iter().flat_map(|f| f.to_le_bytes()).collect();
            stmt.execute(params![chunk_id, embedding_bytes])?;
        }

        Ok(())
    }

    /// Get all chunks of a document in reading order
    pub fn get_chunks(&self, document_id: &str) -> ServiceResult<Vec<Chunk>> {
        let conn = self.conn();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT id, document_id, chunk_index, page_number, content
                FROM chunks
                WHERE document_id = ?1
                ORDER BY chunk_index
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![document_id], Chunk::from_row)
            .map_err(DatabaseError::Query)?;

        let mut chunks = Vec::new();
        for row in rows {
            chunks.push(row.map_err(DatabaseError::Query)?);
        }

        Ok(chunks)
    }

    /// Count chunks of a document that have an embedding
    #[cfg(test)]
    pub fn get_embedding_count(&self, document_id: &str) -> ServiceResult<usize> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                r#"
                SELECT COUNT(*) FROM chunk_embeddings e
                JOIN chunks c ON c.id = e.chunk_id
                WHERE c.document_id = ?1
                "#,
                params![document_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;
        Ok(count as usize)
    }

    /// Rank a document's chunks by cosine similarity to `query_embedding`
    pub fn search_chunks(
        &self,
        document_id: &str,
        query_embedding: &[f32],
        limit: usize,
    ) -> ServiceResult<Vec<(Chunk, f32)>> {
        let conn = self.conn();

        let mut stmt = conn
            .prepare(
                r#"
                SELECT c.id, c.document_id, c.chunk_index, c.page_number, c.content, e.embedding
                FROM chunks c
                JOIN chunk_embeddings e ON c.id = e.chunk_id
                WHERE c.document_id = ?1
                "#,
            )
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![document_id], |row| {
                let embedding_bytes: Vec<u8> = row.get(5)?;
                let chunk = Chunk::from_row(row)?;
                Ok((chunk, embedding_bytes))
            })
            .map_err(DatabaseError::Query)?;

        let mut results: Vec<(Chunk, f32)> = Vec::new();

        for row in rows {
            let (chunk, embedding_bytes) = row.map_err(DatabaseError::Query)?;

            // Convert bytes back to f32 slice
            let embedding: Vec<f32> = embedding_bytes
                .chunks_exact(4)
                .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
                .collect();

            if embedding.len() != query_embedding.len() {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: embedding.len(),
                    actual: query_embedding.len(),
                }
                .into());
            }

            let similarity = cosine_similarity(query_embedding, &embedding);
            results.push((chunk, similarity));
        }

        // Sort by similarity (descending), ties in reading order
        results.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.chunk_index.cmp(&b.0.chunk_index))
        });

        results.truncate(limit);

        Ok(results)
    }
}

/// Calculate cosine similarity between two vectors
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
