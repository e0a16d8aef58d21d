//! In-memory document store.
//!
//! Backs tests and smoke runs without a search engine. Supports the same
//! narrow contract as the Meilisearch backend, with naive substring search
//! and equality-only filter expressions (`field = 'value'`, AND-combined).

use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Instant;

use super::{DocumentStore, SearchRequest, SearchResponse, StoreHealth};
use crate::models::Document;

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, Document>>,
    upsert_calls: AtomicU64,
    upserted_documents: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.documents.read().unwrap().contains_key(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.documents.read().unwrap().keys().cloned().collect()
    }

    /// Number of `upsert_batch` calls seen (for asserting batching and the
    /// unchanged-file fast path in tests).
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    /// Total documents across all upsert calls.
    pub fn upserted_documents(&self) -> u64 {
        self.upserted_documents.load(Ordering::Relaxed)
    }
}

/// Evaluate an equality-only filter expression against a document.
fn matches_filter(doc: &Document, filter: &str) -> bool {
    filter.split(" AND ").all(|clause| {
        let Some((field, value)) = parse_clause(clause) else {
            return false;
        };
        match field.as_str() {
            "source_id" => doc.source_id == value,
            "type" => doc.doc_type == value,
            "extension" => doc.extension == value,
            "id" => doc.id == value,
            _ => false,
        }
    })
}

fn parse_clause(clause: &str) -> Option<(String, String)> {
    let (field, value) = clause.split_once('=')?;
    let value = value.trim().strip_prefix('\'')?.strip_suffix('\'')?;
    let unescaped = value.replace("\\'", "'").replace("\\\\", "\\");
    Some((field.trim().to_string(), unescaped))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let mut map = self.documents.write().unwrap();
        for doc in documents {
            map.insert(doc.id.clone(), doc.clone());
        }
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        self.upserted_documents
            .fetch_add(documents.len() as u64, Ordering::Relaxed);
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.documents.write().unwrap().remove(id);
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &str) -> Result<()> {
        self.documents
            .write()
            .unwrap()
            .retain(|_, doc| !matches_filter(doc, filter));
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let query = request.query.to_lowercase();
        let map = self.documents.read().unwrap();

        let matched: Vec<&Document> = map
            .values()
            .filter(|doc| {
                if let Some(filter) = &request.filter {
                    if !matches_filter(doc, filter) {
                        return false;
                    }
                }
                if query.is_empty() {
                    return true;
                }
                doc.content.to_lowercase().contains(&query)
                    || doc.basename.to_lowercase().contains(&query)
                    || doc.path.to_lowercase().contains(&query)
                    || doc
                        .title
                        .as_deref()
                        .map(|t| t.to_lowercase().contains(&query))
                        .unwrap_or(false)
            })
            .collect();

        let estimated_total = matched.len() as u64;
        let hits = matched
            .into_iter()
            .skip(request.offset)
            .take(request.limit)
            .cloned()
            .collect();

        Ok(SearchResponse {
            hits,
            estimated_total,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.documents.read().unwrap().get(id).cloned())
    }

    async fn health(&self) -> Result<StoreHealth> {
        Ok(StoreHealth {
            status: "available".to_string(),
            document_count: self.len() as u64,
            is_indexing: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::source_filter;
    use serde_json::Map;

    fn doc(id: &str, source_id: &str, content: &str) -> Document {
        Document {
            id: id.to_string(),
            source_id: source_id.to_string(),
            source_name: "Test".to_string(),
            path: format!("/data/{}.txt", id),
            basename: format!("{}.txt", id),
            extension: "txt".to_string(),
            doc_type: "text".to_string(),
            size_bytes: content.len() as i64,
            modified_at: 0,
            indexed_at: 0,
            content: content.to_string(),
            title: None,
            metadata: Map::new(),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_id() {
        let store = MemoryStore::new();
        store.upsert_batch(&[doc("a", "s1", "one")]).await.unwrap();
        store.upsert_batch(&[doc("a", "s1", "two")]).await.unwrap();
        assert_eq!(store.len(), 1);
        let fetched = store.get_by_id("a").await.unwrap().unwrap();
        assert_eq!(fetched.content, "two");
    }

    #[tokio::test]
    async fn delete_by_filter_removes_only_matching_source() {
        let store = MemoryStore::new();
        store
            .upsert_batch(&[doc("a", "s1", "x"), doc("b", "s2", "y")])
            .await
            .unwrap();
        store.delete_by_filter(&source_filter("s1")).await.unwrap();
        assert!(!store.contains("a"));
        assert!(store.contains("b"));
    }

    #[tokio::test]
    async fn search_matches_content_and_respects_filter() {
        let store = MemoryStore::new();
        store
            .upsert_batch(&[doc("a", "s1", "kubernetes deploy"), doc("b", "s2", "kubernetes")])
            .await
            .unwrap();

        let all = store
            .search(&SearchRequest {
                query: "kubernetes".to_string(),
                filter: None,
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(all.estimated_total, 2);

        let filtered = store
            .search(&SearchRequest {
                query: "kubernetes".to_string(),
                filter: Some(source_filter("s1")),
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(filtered.estimated_total, 1);
        assert_eq!(filtered.hits[0].id, "a");
    }
}
