//! Ledger data access.
//!
//! The ledger is the durable (source, path) → last-known-state table behind
//! incremental change detection. A run accumulates its mutations in memory
//! and commits them here as one transaction, so an interrupted run leaves
//! the previous scan's bookkeeping intact.

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::{FileError, FileStatus, IndexedFile};

/// One pending ledger mutation, applied at commit time.
#[derive(Debug, Clone)]
pub enum LedgerOp {
    Upsert(IndexedFile),
    Delete { path: String },
}

/// Load the full ledger map for a source: path → prior record.
pub async fn load(pool: &SqlitePool, source_id: &str) -> Result<HashMap<String, IndexedFile>> {
    let rows = sqlx::query(
        r#"
        SELECT source_id, path, size_bytes, modified_at, indexed_at,
               content_hash, status, error_message
        FROM indexed_files
        WHERE source_id = ?
        "#,
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    let mut map = HashMap::with_capacity(rows.len());
    for row in rows {
        let entry = row_to_indexed_file(&row)?;
        map.insert(entry.path.clone(), entry);
    }
    Ok(map)
}

/// Apply a run's mutations and stamp the source's last-scan time as a
/// single transaction. All-or-nothing: a failure here invalidates the
/// whole run's bookkeeping and must surface to the caller.
pub async fn commit(pool: &SqlitePool, source_id: &str, ops: &[LedgerOp]) -> Result<()> {
    let mut tx = pool.begin().await.context("Ledger commit failed")?;

    for op in ops {
        match op {
            LedgerOp::Upsert(entry) => {
                sqlx::query(
                    r#"
                    INSERT INTO indexed_files
                        (source_id, path, size_bytes, modified_at, indexed_at,
                         content_hash, status, error_message)
                    VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(source_id, path) DO UPDATE SET
                        size_bytes = excluded.size_bytes,
                        modified_at = excluded.modified_at,
                        indexed_at = excluded.indexed_at,
                        content_hash = excluded.content_hash,
                        status = excluded.status,
                        error_message = excluded.error_message
                    "#,
                )
                .bind(&entry.source_id)
                .bind(&entry.path)
                .bind(entry.size_bytes)
                .bind(entry.modified_at)
                .bind(entry.indexed_at)
                .bind(&entry.content_hash)
                .bind(entry.status.as_str())
                .bind(&entry.error_message)
                .execute(&mut *tx)
                .await?;
            }
            LedgerOp::Delete { path } => {
                sqlx::query("DELETE FROM indexed_files WHERE source_id = ? AND path = ?")
                    .bind(source_id)
                    .bind(path)
                    .execute(&mut *tx)
                    .await?;
            }
        }
    }

    sqlx::query("UPDATE sources SET last_scan_at = ? WHERE id = ?")
        .bind(Utc::now().timestamp())
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await.context("Ledger commit failed")?;
    Ok(())
}

/// Drop every ledger row for a source (full rebuild, source deletion).
pub async fn clear(pool: &SqlitePool, source_id: &str) -> Result<()> {
    sqlx::query("DELETE FROM indexed_files WHERE source_id = ?")
        .bind(source_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Aggregate counts for status reporting.
pub struct LedgerSummary {
    pub total: i64,
    pub successful: i64,
    pub failed: i64,
    pub skipped: i64,
    pub last_indexed_at: Option<i64>,
    pub failed_files: Vec<FileError>,
}

/// Per-status counts, last indexed time, and the first `failed_limit`
/// failed files for a source. Pure read.
pub async fn summarize(
    pool: &SqlitePool,
    source_id: &str,
    failed_limit: i64,
) -> Result<LedgerSummary> {
    let rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM indexed_files WHERE source_id = ? GROUP BY status",
    )
    .bind(source_id)
    .fetch_all(pool)
    .await?;

    let mut summary = LedgerSummary {
        total: 0,
        successful: 0,
        failed: 0,
        skipped: 0,
        last_indexed_at: None,
        failed_files: Vec::new(),
    };
    for row in rows {
        let status: String = row.try_get("status")?;
        let n: i64 = row.try_get("n")?;
        summary.total += n;
        match FileStatus::parse(&status) {
            Some(FileStatus::Success) => summary.successful = n,
            Some(FileStatus::Failed) => summary.failed = n,
            Some(FileStatus::Skipped) => summary.skipped = n,
            None => {}
        }
    }

    summary.last_indexed_at =
        sqlx::query_scalar("SELECT MAX(indexed_at) FROM indexed_files WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(pool)
            .await?;

    let failed_rows = sqlx::query(
        r#"
        SELECT path, error_message FROM indexed_files
        WHERE source_id = ? AND status = 'failed'
        ORDER BY path
        LIMIT ?
        "#,
    )
    .bind(source_id)
    .bind(failed_limit)
    .fetch_all(pool)
    .await?;
    for row in failed_rows {
        summary.failed_files.push(FileError {
            path: row.try_get("path")?,
            error: row
                .try_get::<Option<String>, _>("error_message")?
                .unwrap_or_default(),
        });
    }

    Ok(summary)
}

fn row_to_indexed_file(row: &sqlx::sqlite::SqliteRow) -> Result<IndexedFile> {
    let status: String = row.try_get("status")?;
    Ok(IndexedFile {
        source_id: row.try_get("source_id")?,
        path: row.try_get("path")?,
        size_bytes: row.try_get("size_bytes")?,
        modified_at: row.try_get("modified_at")?,
        indexed_at: row.try_get("indexed_at")?,
        content_hash: row.try_get("content_hash")?,
        status: FileStatus::parse(&status).unwrap_or(FileStatus::Failed),
        error_message: row.try_get("error_message")?,
    })
}
