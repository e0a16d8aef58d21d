//! Extractor framework: the capability trait, the registry that resolves a
//! file to its extractor, and the shared helpers for building normalized
//! documents.
//!
//! Extraction failures come in two flavors, and the distinction matters all
//! the way up to search results:
//!
//! * **Hard failures** (oversized file, file vanished, I/O error) return
//!   `Err`; the file produces no document and the ledger records `failed`.
//! * **Soft failures** (corrupt, password-protected, undecodable content)
//!   return a degraded document (empty content, title falling back to the
//!   filename stem, `extraction_failed` flagged in metadata) so the file
//!   stays discoverable by name.

pub mod markdown;
pub mod office;
pub mod pdf;
pub mod text;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{IndexingConfig, LimitsConfig};
use crate::models::Document;

/// Identity of the source a file belongs to, carried into every produced
/// document. Owned so extraction can move onto the blocking pool.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source_id: String,
    pub source_name: String,
}

/// One family of file formats.
///
/// `extract` may block on I/O and CPU-bound parsing; callers run it on a
/// worker thread via [`extract_with_timeout`] rather than on the async
/// executor.
pub trait Extractor: Send + Sync {
    /// Type tag stamped on produced documents (text, markdown, pdf, ...).
    fn name(&self) -> &str;

    /// Lowercase extensions including the leading dot (".md", ".pdf").
    fn extensions(&self) -> &[&'static str];

    /// Pure function of the extension, case-insensitive.
    fn supports(&self, path: &Path) -> bool {
        match path.extension() {
            Some(ext) => {
                let dotted = format!(".{}", ext.to_string_lossy().to_lowercase());
                self.extensions().contains(&dotted.as_str())
            }
            None => false,
        }
    }

    /// Hard cap in bytes; larger files are rejected before extraction.
    fn max_file_size(&self) -> u64;

    /// Wall-clock bound for one extraction.
    fn timeout(&self) -> Duration;

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document>;
}

/// Ordered extractor list; first `supports` match wins.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// Registry with the built-in extractors in their canonical order:
    /// text, markdown, pdf, docx, xlsx, pptx.
    pub fn with_defaults(limits: &LimitsConfig, indexing: &IndexingConfig) -> Self {
        let keywords: Arc<Vec<String>> = Arc::new(
            indexing
                .password_keywords
                .iter()
                .map(|k| k.to_lowercase())
                .collect(),
        );

        let text_size = limits.max_text_file_size_mb * 1024 * 1024;
        let pdf_size = limits.max_pdf_file_size_mb * 1024 * 1024;
        let office_size = limits.max_office_file_size_mb * 1024 * 1024;
        let text_timeout = Duration::from_secs(limits.text_timeout_secs);
        let pdf_timeout = Duration::from_secs(limits.pdf_timeout_secs);
        let office_timeout = Duration::from_secs(limits.office_timeout_secs);

        let mut registry = Self::new();
        registry.register(Arc::new(text::TextExtractor::new(text_size, text_timeout)));
        registry.register(Arc::new(markdown::MarkdownExtractor::new(
            text_size,
            text_timeout,
        )));
        registry.register(Arc::new(pdf::PdfExtractor::new(
            pdf_size,
            pdf_timeout,
            keywords.clone(),
        )));
        registry.register(Arc::new(office::DocxExtractor::new(
            office_size,
            office_timeout,
            keywords.clone(),
        )));
        registry.register(Arc::new(office::XlsxExtractor::new(
            office_size,
            office_timeout,
            keywords.clone(),
        )));
        registry.register(Arc::new(office::PptxExtractor::new(
            office_size,
            office_timeout,
            keywords,
        )));
        registry
    }

    pub fn register(&mut self, extractor: Arc<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// First registered extractor supporting the path, or `None`, which the
    /// orchestrator treats as "unsupported type" rather than an error.
    pub fn find(&self, path: &Path) -> Option<Arc<dyn Extractor>> {
        self.extractors.iter().find(|e| e.supports(path)).cloned()
    }

    /// Sorted union of all supported extensions.
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions: Vec<String> = self
            .extractors
            .iter()
            .flat_map(|e| e.extensions().iter().map(|s| s.to_string()))
            .collect();
        extensions.sort();
        extensions.dedup();
        extensions
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a blocking extraction on the worker pool, raced against the
/// extractor's timeout. On timeout the caller gets a distinguished timeout
/// error and the worker is abandoned, not killed; the closure owns all its
/// data, so an orphaned extraction cannot corrupt later files.
pub async fn extract_with_timeout(
    extractor: Arc<dyn Extractor>,
    path: PathBuf,
    source: SourceInfo,
) -> Result<Document> {
    let limit = extractor.timeout();
    let display = path.display().to_string();

    let task = tokio::task::spawn_blocking(move || extractor.extract(&path, &source));

    match tokio::time::timeout(limit, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(anyhow!("extraction panicked for {}: {}", display, join_err)),
        Err(_) => Err(anyhow!(
            "extraction timed out after {}s for {}",
            limit.as_secs(),
            display
        )),
    }
}

/// Stat the file and reject it if it exceeds `max_size`. Returns the size.
pub(crate) fn check_file_size(path: &Path, max_size: u64) -> Result<u64> {
    let meta = std::fs::metadata(path)
        .map_err(|e| anyhow!("file not found: {}: {}", path.display(), e))?;
    if !meta.is_file() {
        bail!("not a file: {}", path.display());
    }
    let size = meta.len();
    if size > max_size {
        bail!(
            "file too large: {:.2}MB (max: {:.2}MB)",
            size as f64 / (1024.0 * 1024.0),
            max_size as f64 / (1024.0 * 1024.0)
        );
    }
    Ok(size)
}

/// Build a document with the common fields populated from the filesystem.
pub(crate) fn base_document(
    path: &Path,
    source: &SourceInfo,
    doc_type: &str,
    content: String,
) -> Result<Document> {
    let meta = std::fs::metadata(path)?;
    let modified_at = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let path_str = path.to_string_lossy().to_string();
    let basename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    Ok(Document {
        id: Document::id_for(&source.source_id, &path_str),
        source_id: source.source_id.clone(),
        source_name: source.source_name.clone(),
        path: path_str,
        basename,
        extension,
        doc_type: doc_type.to_string(),
        size_bytes: meta.len() as i64,
        modified_at,
        indexed_at: Utc::now().timestamp(),
        content,
        title: None,
        metadata: Map::new(),
    })
}

/// Filename without its final extension; the last-resort title.
pub(crate) fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Metadata map for a soft extraction failure.
pub(crate) fn soft_failure_metadata(error: &str) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("extraction_failed".to_string(), Value::Bool(true));
    metadata.insert(
        "extraction_error".to_string(),
        Value::String(error.to_string()),
    );
    metadata
}

/// Heuristic password-protection check: the set of parser errors for
/// encrypted files is large and library-version-dependent, so match the
/// error text against a configurable keyword list instead of error types.
pub(crate) fn is_password_error(error: &str, keywords: &[String]) -> bool {
    let lowered = error.to_lowercase();
    keywords.iter().any(|k| lowered.contains(k))
}

/// Title from the first short, non-empty line of content, with common
/// comment markers stripped. Checks at most the first five lines.
pub(crate) fn title_from_first_line(content: &str) -> Option<String> {
    for line in content.lines().take(5) {
        let mut line = line.trim();
        if line.is_empty() || line.len() > 100 {
            continue;
        }
        for prefix in ["#", "//", "/*", "--", "<!--"] {
            if let Some(rest) = line.strip_prefix(prefix) {
                line = rest.trim();
                break;
            }
        }
        if !line.is_empty() {
            return Some(line.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexingConfig;

    fn default_registry() -> ExtractorRegistry {
        ExtractorRegistry::with_defaults(&LimitsConfig::default(), &IndexingConfig::default())
    }

    #[test]
    fn registry_resolves_by_extension_case_insensitively() {
        let registry = default_registry();
        assert_eq!(registry.find(Path::new("/a/b.TXT")).unwrap().name(), "text");
        assert_eq!(
            registry.find(Path::new("/a/b.Md")).unwrap().name(),
            "markdown"
        );
        assert_eq!(registry.find(Path::new("/a/b.pdf")).unwrap().name(), "pdf");
        assert_eq!(
            registry.find(Path::new("/a/b.docx")).unwrap().name(),
            "docx"
        );
    }

    #[test]
    fn unknown_extension_resolves_to_none() {
        let registry = default_registry();
        assert!(registry.find(Path::new("/a/b.bin")).is_none());
        assert!(registry.find(Path::new("/a/noext")).is_none());
    }

    #[test]
    fn supported_extensions_sorted_and_deduped() {
        let registry = default_registry();
        let extensions = registry.supported_extensions();
        assert!(extensions.contains(&".md".to_string()));
        assert!(extensions.contains(&".pptx".to_string()));
        let mut sorted = extensions.clone();
        sorted.sort();
        assert_eq!(extensions, sorted);
    }

    #[test]
    fn password_heuristic_matches_keywords() {
        let keywords = IndexingConfig::default().password_keywords;
        assert!(is_password_error(
            "workbook is Encrypted with AES",
            &keywords
        ));
        assert!(is_password_error("cannot decrypt stream", &keywords));
        assert!(!is_password_error("unexpected end of archive", &keywords));
    }

    #[test]
    fn first_line_title_strips_comment_markers() {
        assert_eq!(
            title_from_first_line("// build script\nrest").as_deref(),
            Some("build script")
        );
        assert_eq!(
            title_from_first_line("\n\n# Heading\n").as_deref(),
            Some("Heading")
        );
        assert_eq!(title_from_first_line(""), None);
    }
}
