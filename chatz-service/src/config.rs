//! Service configuration.
//!
//! Loaded once at startup from an optional `config.{toml,yaml,json}` file in
//! the working directory, overridden by `CHATZ__SECTION__KEY` environment
//! variables. Every field has a default so an empty environment is valid.

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub ollama: OllamaConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds the registry database and the `blobs/` directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("chatz.db")
    }

    pub fn blob_dir(&self) -> PathBuf {
        self.data_dir.join("blobs")
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Size limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_document_size")]
    pub max_document_size_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_document_size_bytes: default_max_document_size(),
        }
    }
}

/// Text extraction and chunking
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Chunk size in words
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Characters of extracted text returned by the extract stage
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            preview_chars: default_preview_chars(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProvider {
    /// Feature-hashing embedder, runs in-process
    #[default]
    Hashing,
    /// Ollama `/api/embeddings`
    Ollama,
}

/// Embeddings configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Ollama embedding model (ignored by the hashing provider)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Vector width of the hashing provider
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            model: default_embedding_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Ollama LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_url")]
    pub base_url: String,

    /// Chat model used by the `ollama` answer mode
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_ollama_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_url(),
            model: default_model(),
            temperature: default_temperature(),
            request_timeout_secs: default_ollama_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerMode {
    /// Pick the best matching sentences out of the retrieved chunks
    #[default]
    Extractive,
    /// Ask an Ollama chat model, grounded on the retrieved chunks
    Ollama,
}

/// Retrieval and answering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,

    #[serde(default = "default_max_answer_sentences")]
    pub max_answer_sentences: usize,

    #[serde(default)]
    pub answer_mode: AnswerMode,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            snippet_chars: default_snippet_chars(),
            max_answer_sentences: default_max_answer_sentences(),
            answer_mode: AnswerMode::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Logging configuration, consumed once by `init_logging`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,

    #[serde(default)]
    pub format: LogFormat,

    /// When set, also write daily-rolling `app.log` and `error.log` here
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

impl Config {
    /// Load configuration from file and env vars
    pub fn load() -> ServiceResult<Self> {
        let config: Config = ConfigBuilder::builder()
            .add_source(File::with_name("config").required(false))
            .add_source(
                Environment::with_prefix("CHATZ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to build config: {}", e),
            })?
            .try_deserialize()
            .map_err(|e| ServiceError::Config {
                message: format!("Failed to deserialize config: {}", e),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the pipeline cannot run with
    pub fn validate(&self) -> ServiceResult<()> {
        if self.pipeline.chunk_size == 0 {
            return Err(config_error("pipeline.chunk_size must be greater than 0"));
        }
        if self.pipeline.chunk_overlap >= self.pipeline.chunk_size {
            return Err(config_error(
                "pipeline.chunk_overlap must be smaller than pipeline.chunk_size",
            ));
        }
        if self.embeddings.dimensions == 0 {
            return Err(config_error("embeddings.dimensions must be greater than 0"));
        }
        if self.query.top_k == 0 {
            return Err(config_error("query.top_k must be greater than 0"));
        }
        if self.limits.max_document_size_bytes == 0 {
            return Err(config_error(
                "limits.max_document_size_bytes must be greater than 0",
            ));
        }
        Ok(())
    }
}

fn config_error(message: &str) -> ServiceError {
    ServiceError::Config {
        message: message.to_string(),
    }
}

// ==================== Default Value Functions ====================

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_document_size() -> u64 {
    50 * 1024 * 1024
}

fn default_chunk_size() -> usize {
    200
}

fn default_chunk_overlap() -> usize {
    40
}

fn default_preview_chars() -> usize {
    1000
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_dimensions() -> usize {
    384
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_ollama_timeout_secs() -> u64 {
    120
}

fn default_top_k() -> usize {
    4
}

fn default_snippet_chars() -> usize {
    400
}

fn default_max_answer_sentences() -> usize {
    3
}

fn default_log_filter() -> String {
    "chatz_service=info,tower_http=info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Hashing);
        assert_eq!(config.query.answer_mode, AnswerMode::Extractive);
        assert_eq!(
            config.storage.database_path(),
            PathBuf::from("./data").join("chatz.db")
        );
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = Config::default();
        config.pipeline.chunk_size = 10;
        config.pipeline.chunk_overlap = 10;
        assert!(matches!(
            config.validate(),
            Err(ServiceError::Config { .. })
        ));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = ConfigBuilder::builder()
            .add_source(File::from_str(
                "[pipeline]\nchunk_size = 50\n\n[embeddings]\nprovider = \"ollama\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.pipeline.chunk_size, 50);
        assert_eq!(config.pipeline.chunk_overlap, 40);
        assert_eq!(config.embeddings.provider, EmbeddingProvider::Ollama);
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
