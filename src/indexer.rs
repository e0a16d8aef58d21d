//! Indexing orchestration with incremental logic.
//!
//! One [`IndexingService`] owns the per-source run locks and drives the
//! full pipeline for a run: scan → classify against the ledger → extract
//! under timeout → batch to the document store → reconcile deletions →
//! commit the ledger. Per-file failures are contained inside the run loop;
//! only lock conflicts, unknown sources, and ledger/store-fatal conditions
//! surface to the caller.

use anyhow::{anyhow, Context};
use chrono::Utc;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::extract::{check_file_size, extract_with_timeout, ExtractorRegistry, SourceInfo};
use crate::ledger::{self, LedgerOp};
use crate::models::{
    Document, FileStatus, IndexError, IndexedFile, IndexingStats, SourceStatus,
};
use crate::scanner::FileScanner;
use crate::sources;
use crate::store::{source_filter, DocumentStore};

/// Failed-file entries returned by status reports are capped at this many.
const STATUS_FAILED_FILES_LIMIT: i64 = 50;

pub struct IndexingService {
    pool: sqlx::SqlitePool,
    store: Arc<dyn DocumentStore>,
    registry: Arc<ExtractorRegistry>,
    batch_size: usize,
    progress_interval: u64,
    /// Sources with a run in flight. The only concurrency control needed:
    /// different sources index concurrently, the same source never does.
    active: Mutex<HashSet<String>>,
}

/// Releases the per-source run lock on drop, on every exit path.
struct RunLock<'a> {
    active: &'a Mutex<HashSet<String>>,
    source_id: String,
}

impl Drop for RunLock<'_> {
    fn drop(&mut self) {
        self.active.lock().unwrap().remove(&self.source_id);
    }
}

impl IndexingService {
    pub fn new(
        pool: sqlx::SqlitePool,
        store: Arc<dyn DocumentStore>,
        registry: Arc<ExtractorRegistry>,
        batch_size: usize,
        progress_interval: u64,
    ) -> Self {
        Self {
            pool,
            store,
            registry,
            batch_size,
            progress_interval,
            active: Mutex::new(HashSet::new()),
        }
    }

    /// Non-blocking lock acquisition: a concurrent run on the same source is
    /// an immediate conflict, never a queue.
    fn acquire(&self, source_id: &str) -> Result<RunLock<'_>, IndexError> {
        let mut active = self.active.lock().unwrap();
        if !active.insert(source_id.to_string()) {
            return Err(IndexError::AlreadyRunning(source_id.to_string()));
        }
        Ok(RunLock {
            active: &self.active,
            source_id: source_id.to_string(),
        })
    }

    /// Index or re-index a source, returning the run's statistics.
    ///
    /// With `full_rebuild`, all store documents and ledger rows for the
    /// source are cleared first so every file is treated as new. This is
    /// the recovery path for index corruption or ledger/store drift.
    pub async fn run_indexing(
        &self,
        source_id: &str,
        full_rebuild: bool,
    ) -> Result<IndexingStats, IndexError> {
        let source = sources::get(&self.pool, source_id)
            .await?
            .ok_or_else(|| IndexError::SourceNotFound(source_id.to_string()))?;

        let _lock = self.acquire(source_id)?;
        info!(source = %source.id, name = %source.name, full_rebuild, "starting indexing run");

        let mut stats = IndexingStats::default();

        if full_rebuild {
            self.store
                .delete_by_filter(&source_filter(source_id))
                .await
                .context("Full rebuild: failed to clear document store")?;
            ledger::clear(&self.pool, source_id)
                .await
                .context("Full rebuild: failed to clear ledger")?;
        }

        // Scan: materialize the current file set. Only paths are held, not
        // content, so this is bounded by the tree size.
        let scanner = FileScanner::new(
            &source.root_path,
            source.include_patterns.as_deref(),
            source.exclude_patterns.as_deref(),
            false,
        )?;
        let files = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| anyhow!("scan task failed: {}", e))?;
        stats.total_scanned = files.len() as u64;
        info!(source = %source.id, scanned = files.len(), "scan complete");

        let prior = ledger::load(&self.pool, source_id).await?;

        let source_info = SourceInfo {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
        };

        let mut ops: Vec<LedgerOp> = Vec::new();
        let mut batch: Vec<Document> = Vec::new();
        let mut current_paths: HashSet<String> = HashSet::with_capacity(files.len());
        let mut processed: u64 = 0;

        for path in &files {
            let path_str = path.to_string_lossy().to_string();
            current_paths.insert(path_str.clone());

            let meta = match tokio::fs::metadata(path).await {
                Ok(meta) => meta,
                Err(e) => {
                    // Vanished between scan and processing: hard failure.
                    let message = format!("file not found during processing: {}", e);
                    stats.failed += 1;
                    stats.record_error(&path_str, &message);
                    ops.push(LedgerOp::Upsert(ledger_entry(
                        source_id,
                        &path_str,
                        0,
                        Utc::now().timestamp(),
                        FileStatus::Failed,
                        Some(message),
                    )));
                    continue;
                }
            };
            let size = meta.len() as i64;
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or(0);

            // Classification: size or integer-truncated mtime drift means
            // modified; an unchanged file costs one stat call and nothing
            // else. Unchanged-but-skipped files re-resolve the extractor
            // instead, so a newly registered format picks them up.
            match prior.get(&path_str) {
                Some(prev) if prev.size_bytes == size && prev.modified_at == mtime => {
                    if prev.status != FileStatus::Skipped {
                        stats.unchanged_files += 1;
                        continue;
                    }
                    if self.registry.find(path).is_none() {
                        stats.skipped += 1;
                        continue;
                    }
                    stats.modified_files += 1;
                }
                Some(_) => stats.modified_files += 1,
                None => stats.new_files += 1,
            }

            let Some(extractor) = self.registry.find(path) else {
                stats.skipped += 1;
                ops.push(LedgerOp::Upsert(ledger_entry(
                    source_id,
                    &path_str,
                    size,
                    mtime,
                    FileStatus::Skipped,
                    Some("unsupported file type".to_string()),
                )));
                continue;
            };

            // Oversized files are rejected before any extraction is queued;
            // everything else runs on the blocking pool under the
            // extractor's timeout.
            let result = match check_file_size(path, extractor.max_file_size()) {
                Ok(_) => {
                    extract_with_timeout(extractor, path.clone(), source_info.clone()).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(document) => {
                    batch.push(document);
                    stats.successful += 1;
                    ops.push(LedgerOp::Upsert(ledger_entry(
                        source_id,
                        &path_str,
                        size,
                        mtime,
                        FileStatus::Success,
                        None,
                    )));

                    if batch.len() >= self.batch_size {
                        self.store
                            .upsert_batch(&batch)
                            .await
                            .context("Document store batch upsert failed")?;
                        batch.clear();
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!(path = %path_str, error = %message, "extraction failed");
                    stats.failed += 1;
                    stats.record_error(&path_str, &message);
                    ops.push(LedgerOp::Upsert(ledger_entry(
                        source_id,
                        &path_str,
                        size,
                        mtime,
                        FileStatus::Failed,
                        Some(message),
                    )));
                }
            }

            processed += 1;
            if self.progress_interval > 0 && processed % self.progress_interval == 0 {
                info!(
                    source = %source.id,
                    processed,
                    total = files.len(),
                    "indexing progress"
                );
            }
        }

        if !batch.is_empty() {
            self.store
                .upsert_batch(&batch)
                .await
                .context("Document store batch upsert failed")?;
        }

        // Deletion reconciliation: ledger paths absent from this scan are
        // gone from disk. A store-side delete failure is logged and the
        // ledger row removed anyway; a store orphan beats blocking the
        // whole source on one delete call.
        let mut deleted: Vec<&String> = prior
            .keys()
            .filter(|p| !current_paths.contains(*p))
            .collect();
        deleted.sort();
        for path in deleted {
            let doc_id = Document::id_for(source_id, path);
            if let Err(e) = self.store.delete_by_id(&doc_id).await {
                warn!(path = %path, error = %e, "store delete failed for removed file");
            }
            ops.push(LedgerOp::Delete { path: path.clone() });
            stats.deleted_files += 1;
        }

        ledger::commit(&self.pool, source_id, &ops).await?;

        info!(
            source = %source.id,
            successful = stats.successful,
            failed = stats.failed,
            skipped = stats.skipped,
            deleted = stats.deleted_files,
            unchanged = stats.unchanged_files,
            "indexing complete"
        );

        Ok(stats)
    }

    /// Reporting view over the ledger. Never mutates state or triggers
    /// indexing.
    pub async fn source_status(&self, source_id: &str) -> Result<SourceStatus, IndexError> {
        let source = sources::get(&self.pool, source_id)
            .await?
            .ok_or_else(|| IndexError::SourceNotFound(source_id.to_string()))?;

        let summary = ledger::summarize(&self.pool, source_id, STATUS_FAILED_FILES_LIMIT).await?;

        Ok(SourceStatus {
            source_id: source.id,
            source_name: source.name,
            total_files: summary.total,
            successful: summary.successful,
            failed: summary.failed,
            skipped: summary.skipped,
            last_indexed_at: summary.last_indexed_at,
            failed_files: summary.failed_files,
        })
    }
}

fn ledger_entry(
    source_id: &str,
    path: &str,
    size_bytes: i64,
    modified_at: i64,
    status: FileStatus,
    error_message: Option<String>,
) -> IndexedFile {
    IndexedFile {
        source_id: source_id.to_string(),
        path: path.to_string(),
        size_bytes,
        modified_at,
        indexed_at: Utc::now().timestamp(),
        content_hash: None,
        status,
        error_message,
    }
}
