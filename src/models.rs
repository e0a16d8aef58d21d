//! Core data models used throughout filedex.
//!
//! These types represent configured sources, the per-file indexing ledger,
//! and the normalized documents that flow from the extractors into the
//! document store.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Caller-visible failure modes of an indexing run.
///
/// Per-file extraction errors never surface here; they are contained in
/// [`IndexingStats::errors`]. Only the conditions that invalidate or prevent
/// the run as a whole are returned as errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("source not found: {0}")]
    SourceNotFound(String),

    /// A run for this source is already in flight. Never queued or retried
    /// internally; the caller decides whether to try again later.
    #[error("indexing already running for source: {0}")]
    AlreadyRunning(String),

    /// Ledger commit failure, unreachable store, or invalid source root.
    #[error(transparent)]
    Fatal(#[from] anyhow::Error),
}

/// A configured root directory to index, with its filtering rules.
#[derive(Debug, Clone)]
pub struct Source {
    /// URL-safe identifier, unique across the instance.
    pub id: String,
    pub name: String,
    pub root_path: PathBuf,
    /// Include globs; `None` means every file under the root.
    pub include_patterns: Option<Vec<String>>,
    /// Exclude globs; `None` means the scanner's built-in default set,
    /// `Some(vec![])` means exclude nothing.
    pub exclude_patterns: Option<Vec<String>>,
    /// Opaque cron-like schedule string consumed by an external scheduler.
    pub scan_schedule: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub last_scan_at: Option<i64>,
    pub next_scan_at: Option<i64>,
}

/// Outcome recorded in the ledger for one file on its most recent scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    /// A document was produced and sent to the store (including degraded
    /// soft-failure documents, which remain searchable by filename).
    Success,
    /// No document reached the store: oversized, timed out, vanished, or
    /// an extraction error that could not be degraded.
    Failed,
    /// No extractor handles this file type.
    Skipped,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Success => "success",
            FileStatus::Failed => "failed",
            FileStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Option<FileStatus> {
        match s {
            "success" => Some(FileStatus::Success),
            "failed" => Some(FileStatus::Failed),
            "skipped" => Some(FileStatus::Skipped),
            _ => None,
        }
    }
}

/// One ledger row: the last-known state of a (source, path) pair.
///
/// Unique per (source_id, path). Created on first encounter, updated in
/// place on every scan that touches the path, deleted once the path is
/// confirmed gone from the filesystem.
#[derive(Debug, Clone)]
pub struct IndexedFile {
    pub source_id: String,
    pub path: String,
    pub size_bytes: i64,
    /// Integer-truncated mtime (unix seconds), compared against the
    /// filesystem on each scan for change detection.
    pub modified_at: i64,
    pub indexed_at: i64,
    /// Reserved for content-hash change detection; not populated by the
    /// size/mtime fast path.
    pub content_hash: Option<String>,
    pub status: FileStatus,
    pub error_message: Option<String>,
}

/// Normalized extraction output handed to the document store.
///
/// The id is a pure function of (source id, path), so re-indexing the same
/// path overwrites the store entry instead of inserting a duplicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub source_id: String,
    /// Denormalized for display in search results.
    pub source_name: String,
    pub path: String,
    pub basename: String,
    /// Lowercased extension without the leading dot.
    pub extension: String,
    /// Type tag from the extractor that produced this document
    /// (text, markdown, pdf, docx, xlsx, pptx).
    #[serde(rename = "type")]
    pub doc_type: String,
    pub size_bytes: i64,
    pub modified_at: i64,
    pub indexed_at: i64,
    /// Extracted full text; empty on soft extraction failure.
    pub content: String,
    pub title: Option<String>,
    /// Format-specific extras: author, tags, page/slide/row counts,
    /// extraction warnings.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Document {
    /// Deterministic store id for a (source, path) pair:
    /// `{source_id}--{sha256(path) truncated to 12 hex chars}`.
    pub fn id_for(source_id: &str, path: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}--{}", source_id, &digest[..12])
    }
}

/// A (path, error) pair recorded for a file that failed during a run.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    pub path: String,
    pub error: String,
}

/// Per-run error list cap; beyond this, failures are counted but not listed.
pub const MAX_RECORDED_ERRORS: usize = 100;

/// In-memory aggregate for one indexing run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IndexingStats {
    pub total_scanned: u64,
    pub new_files: u64,
    pub modified_files: u64,
    pub unchanged_files: u64,
    pub deleted_files: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: Vec<FileError>,
}

impl IndexingStats {
    pub fn record_error(&mut self, path: &str, error: &str) {
        if self.errors.len() < MAX_RECORDED_ERRORS {
            self.errors.push(FileError {
                path: path.to_string(),
                error: error.to_string(),
            });
        }
    }
}

/// Reporting view over the ledger for one source. Read-only; computing it
/// never mutates state or triggers indexing.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    pub source_id: String,
    pub source_name: String,
    pub total_files: i64,
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
    pub last_indexed_at: Option<i64>,
    /// Capped at 50 entries.
    pub failed_files: Vec<FileError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_is_deterministic() {
        let a = Document::id_for("docs", "/data/docs/readme.md");
        let b = Document::id_for("docs", "/data/docs/readme.md");
        assert_eq!(a, b);
        assert!(a.starts_with("docs--"));
        assert_eq!(a.len(), "docs--".len() + 12);
    }

    #[test]
    fn document_id_differs_by_path_and_source() {
        let a = Document::id_for("docs", "/data/a.txt");
        let b = Document::id_for("docs", "/data/b.txt");
        let c = Document::id_for("notes", "/data/a.txt");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn file_status_roundtrip() {
        for status in [FileStatus::Success, FileStatus::Failed, FileStatus::Skipped] {
            assert_eq!(FileStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(FileStatus::parse("pending"), None);
    }
}
