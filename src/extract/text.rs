//! Plain-text extractor: source code, logs, config files, and anything else
//! that is readable as text.

use anyhow::Result;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

use super::{
    base_document, check_file_size, file_stem, title_from_first_line, Extractor, SourceInfo,
};
use crate::models::Document;

const EXTENSIONS: &[&'static str] = &[
    ".txt", ".text", ".log", ".conf", ".cfg", ".config", ".ini", ".sh", ".bash", ".zsh", ".py",
    ".pyw", ".js", ".jsx", ".ts", ".tsx", ".java", ".c", ".cpp", ".cc", ".h", ".hpp", ".go",
    ".rs", ".rb", ".php", ".css", ".scss", ".sass", ".less", ".html", ".htm", ".xml", ".json",
    ".yaml", ".yml", ".sql", ".r",
];

pub struct TextExtractor {
    max_size: u64,
    timeout: Duration,
}

impl TextExtractor {
    pub fn new(max_size: u64, timeout: Duration) -> Self {
        Self { max_size, timeout }
    }
}

impl Extractor for TextExtractor {
    fn name(&self) -> &str {
        "text"
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
        let (content, encoding) = match String::from_utf8(bytes) {
            Ok(s) => (s, "utf-8"),
            // Undecodable bytes degrade to replacement characters rather
            // than failing the file; the original bytes stay on disk.
            Err(e) => (
                String::from_utf8_lossy(e.as_bytes()).into_owned(),
                "utf-8-lossy",
            ),
        };

        let line_count = content.lines().count();
        let title = title_from_first_line(&content).unwrap_or_else(|| file_stem(path));

        let mut doc = base_document(path, source, self.name(), content)?;
        doc.title = Some(title);
        doc.metadata
            .insert("encoding".to_string(), Value::String(encoding.to_string()));
        doc.metadata
            .insert("line_count".to_string(), Value::from(line_count as u64));

        Ok(doc)
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

    fn extractor() -> TextExtractor {
        TextExtractor::new(10 * 1024 * 1024, Duration::from_secs(5))
    }

    #[test]
    fn extracts_content_and_first_line_title() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deploy.sh");
        fs::write(&path, "# deploy script\necho hi\n").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("deploy script"));
        assert!(doc.content.contains("echo hi"));
        assert_eq!(doc.doc_type, "text");
        assert_eq!(doc.extension, "sh");
        assert_eq!(doc.metadata["line_count"], 2);
    }

    #[test]
    fn title_falls_back_to_stem_for_long_first_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("blob.txt");
        fs::write(&path, "x".repeat(400)).unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("blob"));
    }

    #[test]
    fn invalid_utf8_degrades_lossily() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mixed.log");
        fs::write(&path, b"ok line\n\xff\xfe broken\n").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.metadata["encoding"], "utf-8-lossy");
        assert!(doc.content.contains("ok line"));
    }

    #[test]
    fn oversized_file_is_a_hard_failure() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("big.txt");
        fs::write(&path, "abcdef").unwrap();

        let small = TextExtractor::new(3, Duration::from_secs(5));
        let err = small.extract(&path, &source()).unwrap_err();
        assert!(err.to_string().contains("file too large"));
    }
}
