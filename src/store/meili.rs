//! Meilisearch-backed document store.
//!
//! A thin HTTP client over the Meilisearch document and search APIs. Index
//! settings (searchable/filterable/sortable fields, ranking rules) are
//! pushed on [`MeiliStore::ensure_index`], which `fdx init` calls once.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use super::{DocumentStore, SearchRequest, SearchResponse, StoreHealth};
use crate::config::StoreConfig;
use crate::models::Document;

const SEARCHABLE_FIELDS: &[&str] = &["content", "basename", "path", "title"];
const FILTERABLE_FIELDS: &[&str] = &["source_id", "type", "extension", "modified_at"];
const SORTABLE_FIELDS: &[&str] = &["modified_at", "size_bytes", "basename"];
const RANKING_RULES: &[&str] = &["words", "typo", "proximity", "attribute", "sort", "exactness"];

pub struct MeiliStore {
    client: reqwest::Client,
    base_url: String,
    index: String,
}

impl MeiliStore {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if !config.api_key.is_empty() {
            let value = format!("Bearer {}", config.api_key);
            headers.insert(
                reqwest::header::AUTHORIZATION,
                value
                    .parse()
                    .map_err(|_| anyhow!("store API key is not a valid header value"))?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build store HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
        })
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/indexes/{}{}", self.base_url, self.index, suffix)
    }

    /// Create the index (idempotent) and push its settings.
    pub async fn ensure_index(&self) -> Result<()> {
        let resp = self
            .client
            .post(format!("{}/indexes", self.base_url))
            .json(&json!({ "uid": self.index, "primaryKey": "id" }))
            .send()
            .await
            .context("Document store unreachable")?;
        // An existing index is fine; anything else is not.
        if !resp.status().is_success() && resp.status() != StatusCode::CONFLICT {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("index create failed: {}: {}", status, body);
        }

        let settings = json!({
            "searchableAttributes": SEARCHABLE_FIELDS,
            "filterableAttributes": FILTERABLE_FIELDS,
            "sortableAttributes": SORTABLE_FIELDS,
            "rankingRules": RANKING_RULES,
        });
        let resp = self
            .client
            .patch(self.index_url("/settings"))
            .json(&settings)
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("index settings update failed: {}: {}", status, body);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MeiliStore {
    async fn upsert_batch(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let resp = self
            .client
            .post(self.index_url("/documents"))
            .json(documents)
            .send()
            .await
            .context("Document store unreachable")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("document upsert failed: {}: {}", status, body);
        }
        debug!(count = documents.len(), "upserted document batch");
        Ok(())
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.index_url(&format!("/documents/{}", id)))
            .send()
            .await?;
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            anyhow::bail!("document delete failed: {}", resp.status());
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: &str) -> Result<()> {
        let resp = self
            .client
            .post(self.index_url("/documents/delete"))
            .json(&json!({ "filter": filter }))
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("delete-by-filter failed: {}: {}", status, body);
        }
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let mut body = json!({
            "q": request.query,
            "limit": request.limit,
            "offset": request.offset,
            "attributesToHighlight": ["content"],
            "highlightPreTag": "<mark>",
            "highlightPostTag": "</mark>",
        });
        if let Some(filter) = &request.filter {
            body["filter"] = json!(filter);
        }

        let resp = self
            .client
            .post(self.index_url("/search"))
            .json(&body)
            .send()
            .await
            .context("Document store unreachable")?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("search failed: {}: {}", status, body);
        }

        let payload: serde_json::Value = resp.json().await?;
        let hits = payload["hits"]
            .as_array()
            .map(|hits| {
                hits.iter()
                    .filter_map(|h| serde_json::from_value(h.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchResponse {
            hits,
            estimated_total: payload["estimatedTotalHits"].as_u64().unwrap_or(0),
            processing_time_ms: payload["processingTimeMs"].as_u64().unwrap_or(0),
        })
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        let resp = self
            .client
            .get(self.index_url(&format!("/documents/{}", id)))
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            anyhow::bail!("document fetch failed: {}", resp.status());
        }
        Ok(Some(resp.json().await?))
    }

    async fn health(&self) -> Result<StoreHealth> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .context("Document store unreachable")?;
        let health: serde_json::Value = resp.json().await?;
        let status = health["status"].as_str().unwrap_or("unknown").to_string();

        let stats: serde_json::Value = self
            .client
            .get(self.index_url("/stats"))
            .send()
            .await?
            .json()
            .await
            .unwrap_or_default();

        Ok(StoreHealth {
            status,
            document_count: stats["numberOfDocuments"].as_u64().unwrap_or(0),
            is_indexing: stats["isIndexing"].as_bool().unwrap_or(false),
        })
    }
}
