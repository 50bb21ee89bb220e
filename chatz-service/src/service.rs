//! Pipeline coordinator.
//!
//! `ChatzService` drives a document through upload, extract, embed and ready,
//! and answers questions once it is ready. Each stage checks the document's
//! status up front so it can fail before doing any work, then commits its
//! artifacts together with the status change through the registry's
//! compare-and-swap. The commit-time check is the one that counts.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AnswerMode, Config, EmbeddingProvider};
use crate::db::{Database, Document, DocumentStatus};
use crate::embeddings::Embedder;
use crate::error::{ServiceError, ServiceResult, ValidationKind};
use crate::ingestion::{IngestionService, content_hash};
use crate::ollama::OllamaClient;
use crate::search::{QueryAnswer, SearchService};
use crate::storage::ObjectStore;

/// Result of an upload
#[derive(Debug, Clone, Serialize)]
pub struct UploadOutcome {
    pub document: Document,
    /// True when a document with this name already existed and was returned
    /// instead of storing a new one
    pub deduplicated: bool,
}

/// Result of the extract stage
#[derive(Debug, Clone, Serialize)]
pub struct ExtractOutcome {
    pub document: Document,
    pub preview_text: String,
    pub page_count: u32,
}

/// Main service coordinator
pub struct ChatzService {
    db: Arc<Database>,
    store: Arc<ObjectStore>,
    ingestion: IngestionService,
    embedder: Arc<Embedder>,
    search: SearchService,
    max_document_size: u64,
}

impl ChatzService {
    /// Create a new service instance over an opened registry and blob store
    pub async fn new(
        config: &Config,
        db: Arc<Database>,
        store: Arc<ObjectStore>,
    ) -> ServiceResult<Self> {
        info!("Initializing ChatZ service");

        let ollama = Arc::new(OllamaClient::new(config.ollama.clone())?);

        let uses_ollama = config.embeddings.provider == EmbeddingProvider::Ollama
            || config.query.answer_mode == AnswerMode::Ollama;
        if uses_ollama {
            if ollama.health_check().await {
                info!(url = %ollama.base_url(), "Ollama is available");
            } else {
                warn!(url = %ollama.base_url(), "Ollama is not available");
            }
        }

        let embedder = Arc::new(Embedder::from_config(&config.embeddings, ollama.clone())?);
        let search = SearchService::new(
            db.clone(),
            embedder.clone(),
            ollama,
            config.query.clone(),
        );

        Ok(Self {
            db,
            store,
            ingestion: IngestionService::new(&config.pipeline),
            embedder,
            search,
            max_document_size: config.limits.max_document_size_bytes,
        })
    }

    /// Store and register a PDF under `file_name`.
    ///
    /// A name that is already registered short-circuits: the existing record
    /// comes back with `deduplicated` set and nothing is written.
    pub async fn upload(&self, file_name: &str, content: Bytes) -> ServiceResult<UploadOutcome> {
        let file_name = file_name.trim();
        if file_name.is_empty() {
            return Err(ServiceError::validation(
                ValidationKind::EmptyName,
                "File name must not be empty",
            ));
        }

        if let Some(existing) = self.db.find_document_by_name(file_name)? {
            info!(doc_id = %existing.id, file_name = %file_name, "Duplicate upload, returning existing document");
            return Ok(UploadOutcome {
                document: existing,
                deduplicated: true,
            });
        }

        if content.is_empty() {
            return Err(ServiceError::validation(
                ValidationKind::EmptyFile,
                "Uploaded file is empty",
            ));
        }

        if content.len() as u64 > self.max_document_size {
            return Err(ServiceError::validation(
                ValidationKind::FileTooLarge,
                format!(
                    "File is {} bytes, the limit is {} bytes",
                    content.len(),
                    self.max_document_size
                ),
            ));
        }

        let file_size = content.len() as u64;
        let store = self.store.clone();
        let ingestion = self.ingestion.clone();
        let rejected_name = file_name.to_string();
        let (id, info, hash) = blocking(move || {
            let id = store.put(&content)?;
            match ingestion.inspect(&content) {
                Ok(info) => Ok((id, info, content_hash(&content))),
                Err(e) => {
                    store.delete(&id);
                    warn!(file_name = %rejected_name, error = %e, "Rejected upload");
                    Err(e.into())
                }
            }
        })
        .await?;

        let now = Utc::now();
        let document = Document {
            id: id.clone(),
            file_name: file_name.to_string(),
            status: DocumentStatus::Uploaded,
            file_size,
            page_count: info.page_count,
            content_hash: hash,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
        };

        match self.db.insert_document(&document) {
            Ok(()) => {}
            Err(ServiceError::Conflict { .. }) => {
                // A concurrent upload of the same name committed first
                self.store.delete(&id);
                let winner = self.db.find_document_by_name(file_name)?.ok_or_else(|| {
                    ServiceError::Conflict {
                        file_name: file_name.to_string(),
                    }
                })?;
                info!(doc_id = %winner.id, file_name = %file_name, "Lost upload race, returning existing document");
                return Ok(UploadOutcome {
                    document: winner,
                    deduplicated: true,
                });
            }
            Err(e) => {
                self.store.delete(&id);
                return Err(e);
            }
        }

        info!(
            doc_id = %id,
            file_name = %file_name,
            pages = info.page_count,
            size = document.file_size,
            "Document uploaded"
        );

        Ok(UploadOutcome {
            document,
            deduplicated: false,
        })
    }

    /// Extract and chunk the text of an `Uploaded` document
    pub async fn extract(&self, document_id: &str) -> ServiceResult<ExtractOutcome> {
        self.require_status(document_id, DocumentStatus::Uploaded)?;

        let db = self.db.clone();
        let store = self.store.clone();
        let ingestion = self.ingestion.clone();
        let id = document_id.to_string();
        let (document, extracted) = blocking(move || {
            let content = store.get(&id)?;
            let extracted = ingestion.extract(&id, &content)?;
            let document = db.advance_status_with(
                &id,
                DocumentStatus::Uploaded,
                DocumentStatus::Extracted,
                |tx| Database::insert_chunks(tx, &extracted.chunks),
            )?;
            Ok((document, extracted))
        })
        .await?;

        info!(doc_id = %document_id, chunks = document.chunk_count, "Document extracted");

        Ok(ExtractOutcome {
            document,
            preview_text: extracted.preview,
            page_count: extracted.page_count,
        })
    }

    /// Embed every chunk of an `Extracted` document
    pub async fn embed(&self, document_id: &str) -> ServiceResult<Document> {
        self.require_status(document_id, DocumentStatus::Extracted)?;

        let chunks = self.db.get_chunks(document_id)?;
        let texts: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
        let vectors = self.embedder.embed_all(&texts).await?;

        let embeddings: Vec<(String, Vec<f32>)> = chunks
            .iter()
            .map(|c| c.id.clone())
            .zip(vectors)
            .collect();

        let document = self.db.advance_status_with(
            document_id,
            DocumentStatus::Extracted,
            DocumentStatus::Embedded,
            |tx| Database::insert_embeddings(tx, &embeddings),
        )?;

        info!(
            doc_id = %document_id,
            chunks = embeddings.len(),
            backend = self.embedder.name(),
            "Document embedded"
        );

        Ok(document)
    }

    /// Mark an `Embedded` document as queryable
    pub async fn mark_ready(&self, document_id: &str) -> ServiceResult<Document> {
        let document = self.db.advance_status(
            document_id,
            DocumentStatus::Embedded,
            DocumentStatus::Ready,
        )?;

        info!(doc_id = %document_id, "Document ready");
        Ok(document)
    }

    /// Answer `question` from a `Ready` document
    pub async fn query(&self, document_id: &str, question: &str) -> ServiceResult<QueryAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ServiceError::validation(
                ValidationKind::EmptyQuestion,
                "Question must not be empty",
            ));
        }

        self.require_status(document_id, DocumentStatus::Ready)?;

        let answer = self.search.answer(document_id, question).await?;

        info!(doc_id = %document_id, sources = answer.sources.len(), "Question answered");
        Ok(answer)
    }

    pub fn get_document(&self, document_id: &str) -> ServiceResult<Document> {
        self.db
            .get_document(document_id)?
            .ok_or_else(|| ServiceError::DocumentNotFound {
                document_id: document_id.to_string(),
            })
    }

    pub fn list_documents(&self) -> ServiceResult<Vec<Document>> {
        self.db.list_documents()
    }

    /// Fetch a document and check it is at `expected`
    fn require_status(&self, document_id: &str, expected: DocumentStatus) -> ServiceResult<Document> {
        let document = self.get_document(document_id)?;
        if document.status != expected {
            return Err(ServiceError::InvalidTransition {
                document_id: document_id.to_string(),
                expected,
                actual: document.status,
            });
        }
        Ok(document)
    }
}

/// Run PDF parsing and blob I/O on the blocking pool
async fn blocking<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await?
}
