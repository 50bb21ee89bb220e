//! PDF validation and page text extraction.

use lopdf::Document;
use tracing::{debug, warn};

use crate::error::PdfError;

/// What upload validation learns about a PDF
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfInfo {
    pub page_count: u32,
}

/// Text of a single page, whitespace-normalized
#[derive(Debug, Clone)]
pub struct PageText {
    /// 1-indexed
    pub page_number: u32,
    pub text: String,
}

/// Parse `bytes` and report the page count.
///
/// Unparseable input is `Corrupted`; encrypted documents are rejected as
/// unsupported rather than decrypted.
pub fn inspect(bytes: &[u8]) -> Result<PdfInfo, PdfError> {
    let document = load(bytes)?;
    let page_count = document.get_pages().len() as u32;
    if page_count == 0 {
        return Err(PdfError::NoPages);
    }

    debug!(pages = page_count, "PDF validated");
    Ok(PdfInfo { page_count })
}

/// Extract the text of every page, in page order.
///
/// Pages whose text cannot be decoded are kept with empty text, so page
/// numbering stays aligned with the document.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, PdfError> {
    let document = load(bytes)?;

    let mut pages = Vec::new();
    for page_number in document.get_pages().into_keys() {
        let text = match document.extract_text(&[page_number]) {
            Ok(raw) => normalize_whitespace(&raw),
            Err(e) => {
                warn!(page = page_number, error = %e, "Failed to extract page text");
                String::new()
            }
        };
        pages.push(PageText { page_number, text });
    }

    if pages.is_empty() {
        return Err(PdfError::NoPages);
    }

    Ok(pages)
}

fn load(bytes: &[u8]) -> Result<Document, PdfError> {
    let document = Document::load_mem(bytes).map_err(|e| {
        let reason = e.to_string();
        let lower = reason.to_lowercase();
        if lower.contains("encrypt") || lower.contains("decrypt") || lower.contains("password") {
            PdfError::Encrypted
        } else {
            PdfError::Corrupted { reason }
        }
    })?;

    if document.is_encrypted() {
        return Err(PdfError::Encrypted);
    }

    Ok(document)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// In-memory PDFs for tests
#[cfg(test)]
pub(crate) mod fixtures {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    /// Build a PDF with one page per entry, each line drawn as its own text
    /// object in a standard font.
    pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
        save(build(pages))
    }

    /// A one-page PDF whose trailer declares standard password encryption
    pub fn encrypted_pdf() -> Vec<u8> {
        let mut doc = build(&[&["Top secret figures."]]);
        let encrypt_id = doc.add_object(dictionary! {
            "Filter" => "Standard",
            "V" => 1,
            "R" => 2,
            "O" => Object::string_literal(vec![0u8; 32]),
            "U" => Object::string_literal(vec![0u8; 32]),
            "P" => -4,
        });
        doc.trailer.set("Encrypt", encrypt_id);
        save(doc)
    }

    fn build(pages: &[&[&str]]) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut operations = Vec::new();
            for (i, line) in lines.iter().enumerate() {
                operations.push(Operation::new("BT", vec![]));
                operations.push(Operation::new("Tf", vec!["F1".into(), 12.into()]));
                operations.push(Operation::new(
                    "Td",
                    vec![72.into(), (720 - 16 * i as i64).into()],
                ));
                operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
                operations.push(Operation::new("ET", vec![]));
            }
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode page content"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    fn save(mut doc: Document) -> Vec<u8> {
        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("serialize pdf");
        bytes
    }

    /// A valid single-page PDF with a little text
    pub fn sample_pdf() -> Vec<u8> {
        pdf_with_pages(&[&[
            "The quarterly report covers revenue and costs.",
            "Revenue grew by twelve percent in the third quarter.",
        ]])
    }
}
