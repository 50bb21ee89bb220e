//! Turning stored PDF bytes into validated metadata and text chunks.

pub mod pdf;

use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::db::Chunk;
use crate::error::{PdfError, ServiceResult};

pub use pdf::PdfInfo;

/// Result of the extract stage, ready to be committed
pub struct ExtractedText {
    pub chunks: Vec<Chunk>,
    pub preview: String,
    pub page_count: u32,
}

#[derive(Clone)]
pub struct IngestionService {
    chunk_size: usize,
    chunk_overlap: usize,
    preview_chars: usize,
}

impl IngestionService {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            preview_chars: config.preview_chars,
        }
    }

    /// Check that `bytes` is a readable, unencrypted PDF with at least one page
    pub fn inspect(&self, bytes: &[u8]) -> Result<PdfInfo, PdfError> {
        pdf::inspect(bytes)
    }

    /// Extract page text and split it into chunks bound to `doc_id`
    pub fn extract(&self, doc_id: &str, bytes: &[u8]) -> ServiceResult<ExtractedText> {
        let pages = pdf::extract_pages(bytes)?;
        let page_count = pages.len() as u32;

        let mut chunks = Vec::new();
        let mut preview = String::new();

        for page in pages.iter().filter(|p| !p.text.is_empty()) {
            if preview.chars().count() < self.preview_chars {
                if !preview.is_empty() {
                    preview.push('\n');
                }
                preview.push_str(&page.text);
            }

            for content in chunk_text(&page.text, self.chunk_size, self.chunk_overlap) {
                chunks.push(Chunk {
                    id: Uuid::new_v4().to_string(),
                    document_id: doc_id.to_string(),
                    chunk_index: chunks.len() as i32,
                    page_number: Some(page.page_number as i32),
                    content,
                });
            }
        }

        if chunks.is_empty() {
            return Err(PdfError::NoText.into());
        }

        let preview: String = preview.chars().take(self.preview_chars).collect();

        info!(
            doc_id = %doc_id,
            pages = page_count,
            chunks = chunks.len(),
            "Extracted document text"
        );

        Ok(ExtractedText {
            chunks,
            preview,
            page_count,
        })
    }
}

/// Split text into word windows of `chunk_size` words, consecutive windows
/// sharing `overlap` words.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();

    if words.is_empty() {
        return Vec::new();
    }
    if words.len() <= chunk_size {
        return vec![words.join(" ")];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));

        if end == words.len() {
            break;
        }
        start += step;
    }

    debug!(words = words.len(), chunks = chunks.len(), "Chunked text");
    chunks
}

/// SHA-256 of the uploaded bytes as lowercase hex
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ServiceError, ValidationKind};

    fn service(chunk_size: usize, chunk_overlap: usize) -> IngestionService {
        IngestionService::new(&PipelineConfig {
            chunk_size,
            chunk_overlap,
            preview_chars: 40,
        })
    }

    #[test]
    fn test_chunk_text() {
        let text = "one two three four five six seven eight nine ten eleven twelve";
        let chunks = chunk_text(text, 5, 1);

        assert_eq!(chunks[0], "one two three four five");
        assert_eq!(chunks[1], "five six seven eight nine");
        assert_eq!(chunks[2], "nine ten eleven twelve");
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_chunk_text_short_and_empty() {
        assert_eq!(chunk_text("  just   a few\nwords ", 10, 2), vec!["just a few words"]);
        assert!(chunk_text("   \n\t ", 10, 2).is_empty());
    }

    #[test]
    fn test_chunk_text_covers_every_word() {
        let words: Vec<String> = (0..103).map(|i| format!("w{}", i)).collect();
        let text = words.join(" ");
        let chunks = chunk_text(&text, 20, 5);

        assert!(chunks.iter().all(|c| c.split_whitespace().count() <= 20));
        assert!(chunks.last().unwrap().ends_with("w102"));
        for word in &words {
            assert!(chunks.iter().any(|c| c.split_whitespace().any(|w| w == word)));
        }
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_extract_builds_ordered_chunks() {
        let bytes = pdf::fixtures::pdf_with_pages(&[
            &["Rust has ownership rules", "Each value has an owner"],
            &["Borrowing lets code use a value without owning it"],
        ]);

        let extracted = service(4, 1).extract("doc-1", &bytes).unwrap();
        assert_eq!(extracted.page_count, 2);
        assert!(extracted.preview.contains("ownership"));
        assert!(extracted.preview.chars().count() <= 40);

        let indexes: Vec<i32> = extracted.chunks.iter().map(|c| c.chunk_index).collect();
        let expected: Vec<i32> = (0..extracted.chunks.len() as i32).collect();
        assert_eq!(indexes, expected);
        assert!(extracted.chunks.iter().all(|c| c.document_id == "doc-1"));
        assert_eq!(extracted.chunks.first().unwrap().page_number, Some(1));
        assert_eq!(extracted.chunks.last().unwrap().page_number, Some(2));
    }

    #[test]
    fn test_extract_without_text_fails() {
        let bytes = pdf::fixtures::pdf_with_pages(&[&[]]);
        let err = service(10, 2).extract("doc-1", &bytes).err().unwrap();
        assert!(matches!(
            err,
            ServiceError::Validation {
                kind: ValidationKind::NoText,
                ..
            }
        ));
    }
}
