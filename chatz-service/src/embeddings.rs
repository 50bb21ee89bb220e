//! Text embedding backends.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::{EmbeddingProvider, EmbeddingsConfig};
use crate::error::{EmbeddingError, ServiceResult};
use crate::ollama::OllamaClient;

/// Embedding backend selected by `embeddings.provider`
pub enum Embedder {
    Hashing(HashingEmbedder),
    Ollama {
        client: Arc<OllamaClient>,
        model: String,
    },
}

impl Embedder {
    pub fn from_config(config: &EmbeddingsConfig, ollama: Arc<OllamaClient>) -> ServiceResult<Self> {
        let embedder = match config.provider {
            EmbeddingProvider::Hashing => {
                Embedder::Hashing(HashingEmbedder::new(config.dimensions)?)
            }
            EmbeddingProvider::Ollama => Embedder::Ollama {
                client: ollama,
                model: config.model.clone(),
            },
        };

        info!(backend = embedder.name(), "Embedding backend ready");
        Ok(embedder)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Embedder::Hashing(_) => "hashing",
            Embedder::Ollama { .. } => "ollama",
        }
    }

    pub async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        match self {
            Embedder::Hashing(hashing) => Ok(hashing.embed(text)),
            Embedder::Ollama { client, model } => client.embed(model, text).await,
        }
    }

    /// Embed several texts, in order. All vectors share one width.
    pub async fn embed_all(&self, texts: &[&str]) -> ServiceResult<Vec<Vec<f32>>> {
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());

        for text in texts {
            let vector = self.embed(text).await?;
            if let Some(first) = vectors.first() {
                let expected = first.len();
                if expected != vector.len() {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    }
                    .into());
                }
            }
            vectors.push(vector);
        }

        debug!(count = vectors.len(), backend = self.name(), "Embedded texts");
        Ok(vectors)
    }
}

/// Bag-of-words feature hashing.
///
/// Each token lands in a SHA-256 derived bucket with a derived sign; the
/// vector is L2-normalised so cosine similarity reduces to a dot product.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> ServiceResult<Self> {
        if dimensions == 0 {
            return Err(EmbeddingError::Init {
                message: "dimensions must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(Self { dimensions })
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) % self.dimensions as u64;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket as usize] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        vector
    }
}

/// Lowercased alphanumeric tokens
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}
