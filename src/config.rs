use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub store: StoreConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Document store backend settings. `backend = "meilisearch"` talks to a
/// Meilisearch instance over HTTP; `backend = "memory"` keeps documents in
/// process (useful for tests and smoke runs, not persisted).
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_index_name")]
    pub index: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: default_store_url(),
            api_key: String::new(),
            index: default_index_name(),
        }
    }
}

fn default_backend() -> String {
    "meilisearch".to_string()
}
fn default_store_url() -> String {
    "http://localhost:7700".to_string()
}
fn default_index_name() -> String {
    "documents".to_string()
}

/// Per-format extraction bounds and batching knobs.
///
/// Size limits are hard: an oversized file is never handed to an extractor.
/// Timeouts bound the wall clock of one extraction on the blocking pool.
#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    #[serde(default = "default_text_size_mb")]
    pub max_text_file_size_mb: u64,
    #[serde(default = "default_binary_size_mb")]
    pub max_pdf_file_size_mb: u64,
    #[serde(default = "default_binary_size_mb")]
    pub max_office_file_size_mb: u64,
    #[serde(default = "default_text_timeout")]
    pub text_timeout_secs: u64,
    #[serde(default = "default_binary_timeout")]
    pub pdf_timeout_secs: u64,
    #[serde(default = "default_binary_timeout")]
    pub office_timeout_secs: u64,
    /// Documents per store upsert call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Emit a progress log line every N processed files.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_text_file_size_mb: default_text_size_mb(),
            max_pdf_file_size_mb: default_binary_size_mb(),
            max_office_file_size_mb: default_binary_size_mb(),
            text_timeout_secs: default_text_timeout(),
            pdf_timeout_secs: default_binary_timeout(),
            office_timeout_secs: default_binary_timeout(),
            batch_size: default_batch_size(),
            progress_interval: default_progress_interval(),
        }
    }
}

fn default_text_size_mb() -> u64 {
    10
}
fn default_binary_size_mb() -> u64 {
    50
}
fn default_text_timeout() -> u64 {
    5
}
fn default_binary_timeout() -> u64 {
    30
}
fn default_batch_size() -> usize {
    100
}
fn default_progress_interval() -> u64 {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    /// Parent directories a source root must live under. Empty = unrestricted
    /// (deployments should restrict this to their data mounts).
    #[serde(default)]
    pub allowed_roots: Vec<PathBuf>,
    /// Keywords matched (case-insensitively) against extraction error text to
    /// classify a file as password-protected rather than corrupt.
    #[serde(default = "default_password_keywords")]
    pub password_keywords: Vec<String>,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            allowed_roots: Vec::new(),
            password_keywords: default_password_keywords(),
        }
    }
}

fn default_password_keywords() -> Vec<String> {
    ["password", "encrypted", "protected", "decrypt", "cipher", "encryption"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.limits.batch_size == 0 {
        anyhow::bail!("limits.batch_size must be > 0");
    }

    for (label, secs) in [
        ("limits.text_timeout_secs", config.limits.text_timeout_secs),
        ("limits.pdf_timeout_secs", config.limits.pdf_timeout_secs),
        (
            "limits.office_timeout_secs",
            config.limits.office_timeout_secs,
        ),
    ] {
        if secs == 0 {
            anyhow::bail!("{} must be > 0", label);
        }
    }

    match config.store.backend.as_str() {
        "meilisearch" | "memory" => {}
        other => anyhow::bail!(
            "Unknown store backend: '{}'. Must be meilisearch or memory.",
            other
        ),
    }

    if config.indexing.password_keywords.is_empty() {
        anyhow::bail!("indexing.password_keywords must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let f = write_config(
            r#"
[db]
path = "/tmp/filedex.sqlite"

[store]
backend = "memory"
"#,
        );
        let cfg = load_config(f.path()).unwrap();
        assert_eq!(cfg.limits.batch_size, 100);
        assert_eq!(cfg.limits.max_text_file_size_mb, 10);
        assert_eq!(cfg.limits.pdf_timeout_secs, 30);
        assert!(cfg.indexing.allowed_roots.is_empty());
        assert!(cfg
            .indexing
            .password_keywords
            .contains(&"encrypted".to_string()));
    }

    #[test]
    fn unknown_backend_rejected() {
        let f = write_config(
            r#"
[db]
path = "/tmp/filedex.sqlite"

[store]
backend = "elasticsearch"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn zero_batch_size_rejected() {
        let f = write_config(
            r#"
[db]
path = "/tmp/filedex.sqlite"

[store]
backend = "memory"

[limits]
batch_size = 0
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
