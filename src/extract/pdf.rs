//! PDF extractor: text via `pdf-extract`, document info via `lopdf`.
//!
//! Parse failures, encrypted files, and image-only PDFs all degrade to a
//! soft-failure or warning document so the file stays searchable by name.

use anyhow::{bail, Result};
use lopdf::Object;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{
    base_document, check_file_size, file_stem, is_password_error, soft_failure_metadata,
    Extractor, SourceInfo,
};
use crate::models::Document;

const EXTENSIONS: &[&'static str] = &[".pdf"];

pub struct PdfExtractor {
    max_size: u64,
    timeout: Duration,
    password_keywords: Arc<Vec<String>>,
}

impl PdfExtractor {
    pub fn new(max_size: u64, timeout: Duration, password_keywords: Arc<Vec<String>>) -> Self {
        Self {
            max_size,
            timeout,
            password_keywords,
        }
    }
}

impl Extractor for PdfExtractor {
    fn name(&self) -> &str {
        "pdf"
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn max_file_size(&self) -> u64 {
        self.max_size
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document> {
        check_file_size(path, self.max_size)?;
        let bytes = std::fs::read(path)?;

        let (content, metadata) = match read_pdf(&bytes) {
            Ok(ok) => ok,
            Err(e) => {
                let message = if is_password_error(&e.to_string(), &self.password_keywords) {
                    "file is password-protected".to_string()
                } else {
                    e.to_string()
                };
                (String::new(), soft_failure_metadata(&message))
            }
        };

        let title = metadata
            .get("title")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(path));

        let mut doc = base_document(path, source, self.name(), content)?;
        doc.title = Some(title);
        doc.metadata = metadata;

        Ok(doc)
    }
}

fn read_pdf(bytes: &[u8]) -> Result<(String, Map<String, Value>)> {
    let parsed = lopdf::Document::load_mem(bytes)?;
    if parsed.is_encrypted() {
        bail!("PDF is encrypted and cannot be decrypted");
    }

    let mut metadata = Map::new();
    metadata.insert(
        "page_count".to_string(),
        Value::from(parsed.get_pages().len() as u64),
    );

    // Document info dictionary: Title, Author, Subject, Creator, Producer.
    if let Ok(info) = parsed
        .trailer
        .get(b"Info")
        .and_then(Object::as_reference)
        .and_then(|id| parsed.get_object(id))
        .and_then(Object::as_dict)
    {
        for (key, field) in [
            (b"Title".as_slice(), "title"),
            (b"Author".as_slice(), "author"),
            (b"Subject".as_slice(), "subject"),
            (b"Creator".as_slice(), "creator"),
            (b"Producer".as_slice(), "producer"),
        ] {
            if let Ok(Object::String(raw, _)) = info.get(key) {
                let value = decode_pdf_string(raw);
                if !value.trim().is_empty() {
                    metadata.insert(field.to_string(), Value::String(value));
                }
            }
        }
    }

    let text = pdf_extract::extract_text_from_mem(bytes)?;

    metadata.insert(
        "extracted_text_length".to_string(),
        Value::from(text.len() as u64),
    );
    metadata.insert("extraction_failed".to_string(), Value::Bool(false));
    if text.trim().is_empty() {
        metadata.insert(
            "extraction_warning".to_string(),
            Value::String("no text extracted (might be image-based PDF)".to_string()),
        );
    }

    Ok((text, metadata))
}

/// PDF text strings are either UTF-16BE with a BOM or PDFDocEncoding;
/// the latter is close enough to Latin-1 for titles and author names.
fn decode_pdf_string(raw: &[u8]) -> String {
    if raw.len() >= 2 && raw[0] == 0xFE && raw[1] == 0xFF {
        let units: Vec<u16> = raw[2..]
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        raw.iter().map(|&b| b as char).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source() -> SourceInfo {
        SourceInfo {
            source_id: "docs".to_string(),
            source_name: "Docs".to_string(),
        }
    }

    fn extractor() -> PdfExtractor {
        PdfExtractor::new(
            50 * 1024 * 1024,
            Duration::from_secs(30),
            Arc::new(vec!["password".to_string(), "encrypted".to_string()]),
        )
    }

    #[test]
    fn corrupt_pdf_degrades_to_soft_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.pdf");
        fs::write(&path, "this is not a pdf at all").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.content, "");
        assert_eq!(doc.title.as_deref(), Some("broken"));
        assert_eq!(doc.metadata["extraction_failed"], true);
        assert!(doc.metadata.contains_key("extraction_error"));
    }

    #[test]
    fn utf16_info_strings_decode() {
        assert_eq!(
            decode_pdf_string(&[0xFE, 0xFF, 0x00, b'H', 0x00, b'i']),
            "Hi"
        );
        assert_eq!(decode_pdf_string(b"plain"), "plain");
    }
}
