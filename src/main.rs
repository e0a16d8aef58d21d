//! # filedex CLI (`fdx`)
//!
//! The `fdx` binary is the operational interface for filedex: database
//! initialization, source management, indexing runs, status reports, and
//! search against the document store.
//!
//! ## Usage
//!
//! ```bash
//! fdx --config ./config/filedex.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fdx init` | Create the SQLite database and the store index |
//! | `fdx source add <name> <path>` | Configure a new source |
//! | `fdx source list` | List configured sources |
//! | `fdx source rm <id>` | Delete a source and all its indexed data |
//! | `fdx index <id>` | Run incremental indexing for a source |
//! | `fdx index <id> --full` | Full rebuild: clear and re-index everything |
//! | `fdx status <id>` | Ledger-backed indexing status for a source |
//! | `fdx search "<query>"` | Search indexed documents |
//! | `fdx get <doc-id>` | Retrieve one indexed document |
//! | `fdx health` | Document store health and document count |
//! | `fdx extensions` | List file extensions with a registered extractor |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use filedex::config::{self, Config};
use filedex::extract::ExtractorRegistry;
use filedex::indexer::IndexingService;
use filedex::models::IndexError;
use filedex::store::{self, and_filters, source_filter, type_filter, SearchRequest};
use filedex::{db, migrate, sources};

/// filedex — a self-hosted document indexing and search service.
#[derive(Parser)]
#[command(
    name = "fdx",
    about = "filedex — a self-hosted document indexing and search service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/filedex.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and the document store index.
    ///
    /// Idempotent; running it multiple times is safe.
    Init,

    /// Manage sources (configured root directories).
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Run indexing for a source.
    ///
    /// Incremental by default: unchanged files cost one stat call each.
    /// Fails immediately with a conflict if a run is already in flight
    /// for the same source.
    Index {
        /// Source id.
        source: String,

        /// Clear all indexed data for the source first and treat every
        /// file as new. Recovery path for index corruption.
        #[arg(long)]
        full: bool,
    },

    /// Show the ledger-backed indexing status of a source.
    Status {
        /// Source id.
        source: String,
    },

    /// Search indexed documents.
    Search {
        /// The search query string.
        query: String,

        /// Restrict results to one source id.
        #[arg(long)]
        source: Option<String>,

        /// Restrict results to one document type (text, markdown, pdf, ...).
        #[arg(long = "type")]
        doc_type: Option<String>,

        /// Maximum number of results.
        #[arg(long, default_value_t = 20)]
        limit: usize,

        /// Pagination offset.
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Retrieve one indexed document by its store id.
    Get {
        /// Document id (as shown in search results and derived from
        /// source id + path).
        id: String,
    },

    /// Show document store health and document count.
    Health,

    /// List the file extensions covered by registered extractors.
    Extensions,
}

#[derive(Subcommand)]
enum SourceAction {
    /// Add a new source.
    Add {
        /// Display name; the id is derived from it unless --id is given.
        name: String,

        /// Root directory to index.
        path: PathBuf,

        /// Explicit source id (URL-safe).
        #[arg(long)]
        id: Option<String>,

        /// Include glob (repeatable). Default: every file under the root.
        #[arg(long = "include")]
        include: Vec<String>,

        /// Exclude glob (repeatable). Default: built-in exclusions for
        /// VCS/dependency/build directories; pass --no-default-excludes
        /// to disable those without adding your own.
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// Use an empty exclude list instead of the built-in defaults.
        #[arg(long)]
        no_default_excludes: bool,

        /// Cron-like schedule string, stored for the external scheduler.
        #[arg(long)]
        schedule: Option<String>,
    },

    /// List configured sources.
    List,

    /// Update a source's name, root, patterns, or schedule.
    Set {
        /// Source id.
        id: String,

        /// New display name.
        #[arg(long)]
        name: Option<String>,

        /// New root directory.
        #[arg(long)]
        path: Option<PathBuf>,

        /// Replace the include globs (repeatable).
        #[arg(long = "include")]
        include: Vec<String>,

        /// Replace the exclude globs (repeatable).
        #[arg(long = "exclude")]
        exclude: Vec<String>,

        /// New cron-like schedule string.
        #[arg(long)]
        schedule: Option<String>,
    },

    /// Delete a source, its ledger rows, and its store documents.
    Rm {
        /// Source id.
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&cfg.db.path).await?;
            migrate::run_migrations(&pool).await?;
            if cfg.store.backend == "meilisearch" {
                let meili = filedex::store::meili::MeiliStore::new(&cfg.store)?;
                meili.ensure_index().await?;
            }
            println!("Database initialized successfully.");
        }
        Commands::Source { action } => run_source(&cfg, action).await?,
        Commands::Index { source, full } => {
            let service = build_service(&cfg).await?;
            match service.run_indexing(&source, full).await {
                Ok(stats) => {
                    println!("index {}", source);
                    println!("  scanned:   {}", stats.total_scanned);
                    println!("  new:       {}", stats.new_files);
                    println!("  modified:  {}", stats.modified_files);
                    println!("  unchanged: {}", stats.unchanged_files);
                    println!("  deleted:   {}", stats.deleted_files);
                    println!("  indexed:   {}", stats.successful);
                    println!("  failed:    {}", stats.failed);
                    println!("  skipped:   {}", stats.skipped);
                    for err in &stats.errors {
                        println!("  error: {}: {}", err.path, err.error);
                    }
                    println!("ok");
                }
                Err(IndexError::AlreadyRunning(id)) => {
                    anyhow::bail!("indexing already running for source '{}'", id);
                }
                Err(IndexError::SourceNotFound(id)) => {
                    anyhow::bail!("source not found: '{}'", id);
                }
                Err(IndexError::Fatal(e)) => return Err(e),
            }
        }
        Commands::Status { source } => {
            let service = build_service(&cfg).await?;
            match service.source_status(&source).await {
                Ok(status) => {
                    println!("status {}", status.source_id);
                    println!("  name:         {}", status.source_name);
                    println!("  total files:  {}", status.total_files);
                    println!("  successful:   {}", status.successful);
                    println!("  failed:       {}", status.failed);
                    println!("  skipped:      {}", status.skipped);
                    match status.last_indexed_at {
                        Some(ts) => println!("  last indexed: {}", format_timestamp(ts)),
                        None => println!("  last indexed: never"),
                    }
                    for f in &status.failed_files {
                        println!("  failed: {}: {}", f.path, f.error);
                    }
                }
                Err(IndexError::SourceNotFound(id)) => {
                    anyhow::bail!("source not found: '{}'", id);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Search {
            query,
            source,
            doc_type,
            limit,
            offset,
        } => {
            let store = store::connect(&cfg.store)?;
            let filter = and_filters(&[
                source.map(|s| source_filter(&s)),
                doc_type.map(|t| type_filter(&t)),
            ]);
            let response = store
                .search(&SearchRequest {
                    query,
                    filter,
                    limit,
                    offset,
                })
                .await?;

            if response.hits.is_empty() {
                println!("No results.");
            } else {
                for hit in &response.hits {
                    let title = hit.title.as_deref().unwrap_or(&hit.basename);
                    println!("{}  [{}]  {}", title, hit.doc_type, hit.path);
                }
                println!(
                    "{} results ({} ms)",
                    response.estimated_total, response.processing_time_ms
                );
            }
        }
        Commands::Get { id } => {
            let store = store::connect(&cfg.store)?;
            match store.get_by_id(&id).await? {
                Some(doc) => {
                    println!("id:        {}", doc.id);
                    println!("source:    {} ({})", doc.source_name, doc.source_id);
                    println!("path:      {}", doc.path);
                    println!("type:      {}", doc.doc_type);
                    if let Some(title) = &doc.title {
                        println!("title:     {}", title);
                    }
                    println!("size:      {} bytes", doc.size_bytes);
                    println!("indexed:   {}", format_timestamp(doc.indexed_at));
                    if !doc.metadata.is_empty() {
                        println!("metadata:  {}", serde_json::Value::Object(doc.metadata));
                    }
                    if !doc.content.is_empty() {
                        println!("---");
                        println!("{}", doc.content);
                    }
                }
                None => anyhow::bail!("document not found: '{}'", id),
            }
        }
        Commands::Health => {
            let store = store::connect(&cfg.store)?;
            let health = store.health().await?;
            println!("status:      {}", health.status);
            println!("documents:   {}", health.document_count);
            println!("is indexing: {}", health.is_indexing);
        }
        Commands::Extensions => {
            let registry = ExtractorRegistry::with_defaults(&cfg.limits, &cfg.indexing);
            for ext in registry.supported_extensions() {
                println!("{}", ext);
            }
        }
    }

    Ok(())
}

async fn run_source(cfg: &Config, action: SourceAction) -> Result<()> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;

    match action {
        SourceAction::Add {
            name,
            path,
            id,
            include,
            exclude,
            no_default_excludes,
            schedule,
        } => {
            let exclude_patterns = if no_default_excludes || !exclude.is_empty() {
                Some(exclude)
            } else {
                None
            };
            let created = sources::create(
                &pool,
                &cfg.indexing.allowed_roots,
                sources::NewSource {
                    id,
                    name,
                    root_path: path,
                    include_patterns: (!include.is_empty()).then_some(include),
                    exclude_patterns,
                    scan_schedule: schedule,
                },
            )
            .await?;
            println!(
                "Created source '{}' at {}",
                created.id,
                created.root_path.display()
            );
        }
        SourceAction::List => {
            let all = sources::list(&pool).await?;
            if all.is_empty() {
                println!("No sources configured.");
            } else {
                println!("{:<20} {:<24} {}", "ID", "NAME", "ROOT");
                for s in all {
                    println!("{:<20} {:<24} {}", s.id, s.name, s.root_path.display());
                }
            }
        }
        SourceAction::Set {
            id,
            name,
            path,
            include,
            exclude,
            schedule,
        } => {
            let updated = sources::update(
                &pool,
                &cfg.indexing.allowed_roots,
                &id,
                sources::SourceUpdate {
                    name,
                    root_path: path,
                    include_patterns: (!include.is_empty()).then_some(include),
                    exclude_patterns: (!exclude.is_empty()).then_some(exclude),
                    scan_schedule: schedule,
                },
            )
            .await?;
            println!("Updated source '{}'.", updated.id);
        }
        SourceAction::Rm { id } => {
            let store = store::connect(&cfg.store)?;
            sources::delete(&pool, store.as_ref(), &id).await?;
            println!("Deleted source '{}'.", id);
        }
    }

    Ok(())
}

async fn build_service(cfg: &Config) -> Result<IndexingService> {
    let pool = db::connect(&cfg.db.path).await?;
    migrate::run_migrations(&pool).await?;
    let store = store::connect(&cfg.store)?;
    let registry = Arc::new(ExtractorRegistry::with_defaults(&cfg.limits, &cfg.indexing));
    Ok(IndexingService::new(
        pool,
        store,
        registry,
        cfg.limits.batch_size,
        cfg.limits.progress_interval,
    ))
}

fn format_timestamp(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
