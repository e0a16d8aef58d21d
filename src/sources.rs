//! Source configuration: create, list, update, delete.
//!
//! A source is a root directory plus filtering rules. Deleting a source
//! cascades to its ledger rows and issues a delete-by-filter against the
//! document store for everything tagged with its id.

use anyhow::{bail, Result};
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::models::Source;
use crate::store::{source_filter, DocumentStore};

/// Input for creating a source. Patterns follow the scanner's semantics:
/// `include_patterns: None` means all files, `exclude_patterns: None` means
/// the built-in default exclusions.
#[derive(Debug, Clone, Default)]
pub struct NewSource {
    /// Explicit id; derived from the name when absent.
    pub id: Option<String>,
    pub name: String,
    pub root_path: PathBuf,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub scan_schedule: Option<String>,
}

/// Partial update; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SourceUpdate {
    pub name: Option<String>,
    pub root_path: Option<PathBuf>,
    pub include_patterns: Option<Vec<String>>,
    pub exclude_patterns: Option<Vec<String>>,
    pub scan_schedule: Option<String>,
}

/// URL-safe source id from a display name: lowercased, whitespace to
/// hyphens, everything else dropped.
pub fn slugify(name: &str) -> String {
    let mut id = String::new();
    let mut last_hyphen = false;
    for c in name.trim().to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c);
            last_hyphen = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !last_hyphen && !id.is_empty() {
            id.push('-');
            last_hyphen = true;
        }
    }
    let id = id.trim_end_matches('-').to_string();
    if id.is_empty() {
        "source".to_string()
    } else {
        id
    }
}

pub async fn create(
    pool: &SqlitePool,
    allowed_roots: &[PathBuf],
    new: NewSource,
) -> Result<Source> {
    let id = new.id.unwrap_or_else(|| slugify(&new.name));
    if get(pool, &id).await?.is_some() {
        bail!("Source with id '{}' already exists", id);
    }

    let root = validate_root(&new.root_path, allowed_roots)?;
    let now = Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO sources
            (id, name, root_path, include_patterns, exclude_patterns,
             scan_schedule, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&new.name)
    .bind(root.to_string_lossy().as_ref())
    .bind(encode_patterns(new.include_patterns.as_ref())?)
    .bind(encode_patterns(new.exclude_patterns.as_ref())?)
    .bind(&new.scan_schedule)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    info!(source = %id, root = %root.display(), "created source");
    get(pool, &id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("source vanished after insert: {}", id))
}

pub async fn get(pool: &SqlitePool, id: &str) -> Result<Option<Source>> {
    let row = sqlx::query("SELECT * FROM sources WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(|r| row_to_source(&r)).transpose()
}

pub async fn list(pool: &SqlitePool) -> Result<Vec<Source>> {
    let rows = sqlx::query("SELECT * FROM sources ORDER BY created_at DESC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_source).collect()
}

pub async fn update(
    pool: &SqlitePool,
    allowed_roots: &[PathBuf],
    id: &str,
    patch: SourceUpdate,
) -> Result<Source> {
    let Some(existing) = get(pool, id).await? else {
        bail!("Source not found: {}", id);
    };

    let name = patch.name.unwrap_or(existing.name);
    let root = match patch.root_path {
        Some(root) => validate_root(&root, allowed_roots)?,
        None => existing.root_path,
    };
    let include = patch.include_patterns.or(existing.include_patterns);
    let exclude = patch.exclude_patterns.or(existing.exclude_patterns);
    let schedule = patch.scan_schedule.or(existing.scan_schedule);

    sqlx::query(
        r#"
        UPDATE sources
        SET name = ?, root_path = ?, include_patterns = ?, exclude_patterns = ?,
            scan_schedule = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(root.to_string_lossy().as_ref())
    .bind(encode_patterns(include.as_ref())?)
    .bind(encode_patterns(exclude.as_ref())?)
    .bind(&schedule)
    .bind(Utc::now().timestamp())
    .bind(id)
    .execute(pool)
    .await?;

    info!(source = %id, "updated source");
    get(pool, id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("source vanished after update: {}", id))
}

/// Delete a source, its ledger rows, and its store documents. Store-side
/// failures are logged, not fatal: the configuration and ledger cleanup
/// still complete, and a re-created source would overwrite any orphans.
pub async fn delete(pool: &SqlitePool, store: &dyn DocumentStore, id: &str) -> Result<()> {
    if get(pool, id).await?.is_none() {
        bail!("Source not found: {}", id);
    }

    if let Err(e) = store.delete_by_filter(&source_filter(id)).await {
        warn!(source = %id, error = %e, "failed to delete store documents for source");
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM indexed_files WHERE source_id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM sources WHERE id = ?")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(source = %id, "deleted source");
    Ok(())
}

/// The root must exist, be a directory, and (when an allow-list is
/// configured) resolve under one of the allowed parents.
fn validate_root(root: &Path, allowed_roots: &[PathBuf]) -> Result<PathBuf> {
    let resolved = root
        .canonicalize()
        .map_err(|_| anyhow::anyhow!("Root path does not exist: {}", root.display()))?;
    if !resolved.is_dir() {
        bail!("Root path is not a directory: {}", root.display());
    }
    if !allowed_roots.is_empty()
        && !allowed_roots.iter().any(|allowed| {
            allowed
                .canonicalize()
                .map(|a| resolved.starts_with(a))
                .unwrap_or(false)
        })
    {
        bail!(
            "Root path is not under an allowed parent: {}",
            resolved.display()
        );
    }
    Ok(resolved)
}

fn encode_patterns(patterns: Option<&Vec<String>>) -> Result<Option<String>> {
    patterns
        .map(|p| serde_json::to_string(p).map_err(Into::into))
        .transpose()
}

fn decode_patterns(raw: Option<String>) -> Option<Vec<String>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_source(row: &sqlx::sqlite::SqliteRow) -> Result<Source> {
    Ok(Source {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        root_path: PathBuf::from(row.try_get::<String, _>("root_path")?),
        include_patterns: decode_patterns(row.try_get("include_patterns")?),
        exclude_patterns: decode_patterns(row.try_get("exclude_patterns")?),
        scan_schedule: row.try_get("scan_schedule")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        last_scan_at: row.try_get("last_scan_at")?,
        next_scan_at: row.try_get("next_scan_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_produces_url_safe_ids() {
        assert_eq!(slugify("My Docs"), "my-docs");
        assert_eq!(slugify("  Team Wiki (2024)  "), "team-wiki-2024");
        assert_eq!(slugify("___"), "source");
        assert_eq!(slugify("a__b"), "a-b");
    }
}
