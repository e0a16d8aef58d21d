//! Document store abstraction.
//!
//! The [`DocumentStore`] trait is the narrow contract the indexing pipeline
//! needs from a full-text engine: batched idempotent upserts, deletes by id
//! and by filter, search, and health. The Meilisearch backend talks HTTP;
//! the in-memory backend backs tests and smoke runs.

pub mod meili;
pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::models::Document;

/// A search request against the store.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    /// Store filter expression; build with [`source_filter`] / [`and_filters`]
    /// rather than interpolating values by hand.
    pub filter: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub hits: Vec<Document>,
    pub estimated_total: u64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub status: String,
    pub document_count: u64,
    pub is_indexing: bool,
}

/// Narrow full-text engine contract. Upserts are idempotent per document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()>;

    async fn delete_by_id(&self, id: &str) -> Result<()>;

    async fn delete_by_filter(&self, filter: &str) -> Result<()>;

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>>;

    async fn health(&self) -> Result<StoreHealth>;
}

/// Build the configured backend.
pub fn connect(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    match config.backend.as_str() {
        "meilisearch" => Ok(Arc::new(meili::MeiliStore::new(config)?)),
        "memory" => Ok(Arc::new(memory::MemoryStore::new())),
        other => anyhow::bail!("Unknown store backend: '{}'", other),
    }
}

/// Escape a value for use inside a single-quoted filter string literal.
/// Never interpolate user-supplied values into filters without this.
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Filter expression selecting every document of one source.
pub fn source_filter(source_id: &str) -> String {
    format!("source_id = '{}'", escape_filter_value(source_id))
}

/// Filter expression selecting one document type tag.
pub fn type_filter(doc_type: &str) -> String {
    format!("type = '{}'", escape_filter_value(doc_type))
}

/// AND-combine filter clauses, skipping empties.
pub fn and_filters(clauses: &[Option<String>]) -> Option<String> {
    let present: Vec<&str> = clauses
        .iter()
        .filter_map(|c| c.as_deref())
        .filter(|c| !c.is_empty())
        .collect();
    if present.is_empty() {
        None
    } else {
        Some(present.join(" AND "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_values_are_escaped() {
        assert_eq!(
            source_filter("it's-a-source"),
            r"source_id = 'it\'s-a-source'"
        );
        assert_eq!(escape_filter_value(r"a\b"), r"a\\b");
    }

    #[test]
    fn and_filters_combines_present_clauses() {
        assert_eq!(
            and_filters(&[Some(source_filter("docs")), None, Some(type_filter("pdf"))]),
            Some("source_id = 'docs' AND type = 'pdf'".to_string())
        );
        assert_eq!(and_filters(&[None, None]), None);
    }
}
