use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent; safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sources (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            root_path TEXT NOT NULL,
            include_patterns TEXT,
            exclude_patterns TEXT,
            scan_schedule TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            last_scan_at INTEGER,
            next_scan_at INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    // The ledger: one row per (source, path) ever seen, successfully or not.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_files (
            source_id TEXT NOT NULL REFERENCES sources(id) ON DELETE CASCADE,
            path TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            modified_at INTEGER NOT NULL,
            indexed_at INTEGER NOT NULL,
            content_hash TEXT,
            status TEXT NOT NULL DEFAULT 'success',
            error_message TEXT,
            PRIMARY KEY (source_id, path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_indexed_files_status ON indexed_files(source_id, status)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
