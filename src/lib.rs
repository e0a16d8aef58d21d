//! # filedex
//!
//! A self-hosted document indexing and search service.
//!
//! filedex watches configured filesystem sources, extracts text and metadata
//! from heterogeneous file formats, and feeds normalized documents into a
//! full-text search engine, tracking per-file indexing state for cheap
//! incremental re-scans.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────────┐
//! │   Scanner   │──▶│  Indexing    │──▶│ Document Store │
//! │ walk + glob │   │ Orchestrator │   │ (Meilisearch)  │
//! └─────────────┘   └──────┬───────┘   └───────────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼                       ▼
//!        ┌──────────┐          ┌─────────────┐
//!        │ Extractor │          │   Ledger    │
//!        │ Registry  │          │  (SQLite)   │
//!        └──────────┘          └─────────────┘
//! ```
//!
//! Each run classifies every scanned file as new, modified, unchanged, or
//! deleted by comparing size and mtime against the ledger; only new and
//! modified files are extracted and upserted, and ledger paths missing from
//! the scan are reconciled as deletions. Per-file failures never abort a
//! run: an extraction error records a `failed` ledger row, and a corrupt
//! but readable document degrades to an empty one that stays searchable by
//! filename.
//!
//! ## Quick Start
//!
//! ```bash
//! fdx init                               # create database and store index
//! fdx source add "Docs" /data/docs       # configure a source
//! fdx index docs                         # run the incremental pipeline
//! fdx status docs                        # ledger-backed status report
//! fdx search "deployment runbook"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Filesystem walking with glob filters |
//! | [`extract`] | Extractor capability, registry, format extractors |
//! | [`store`] | Document store contract and backends |
//! | [`ledger`] | Per-file indexing state persistence |
//! | [`indexer`] | The incremental indexing orchestrator |
//! | [`sources`] | Source configuration CRUD |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod extract;
pub mod indexer;
pub mod ledger;
pub mod migrate;
pub mod models;
pub mod scanner;
pub mod sources;
pub mod store;
