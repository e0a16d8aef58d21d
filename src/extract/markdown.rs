//! Markdown extractor with front-matter support.
//!
//! Front matter is parsed as a flat `key: value` block between `---`
//! delimiters, which covers the title/tags/author/date scalars documents
//! actually carry. Nested YAML structures are kept as their raw string
//! value.

use anyhow::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use super::{base_document, check_file_size, file_stem, Extractor, SourceInfo};
use crate::models::Document;

const EXTENSIONS: &[&'static str] = &[".md", ".markdown", ".mdown", ".mkd"];

/// Front-matter keys promoted to top-level metadata alongside the full map.
const PROMOTED_KEYS: &[&str] = &["tags", "date", "author", "description"];

pub struct MarkdownExtractor {
    max_size: u64,
    timeout: Duration,
}

impl MarkdownExtractor {
    pub fn new(max_size: u64, timeout: Duration) -> Self {
        Self { max_size, timeout }
    }
}

impl Extractor for MarkdownExtractor {
    fn name(&self) -> &str {
        "markdown"
    }

    fn extensions(&self) -> &[&'static str] {
        EXTENSIONS
    }

    fn max_file_size(&self) -> u64 {
        self.max_size
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn extract(&self, path: &Path, source: &SourceInfo) -> Result<Document> {
        check_file_size(path, self.max_size)?;

        let bytes = std::fs::read(path)?;
        let raw = String::from_utf8_lossy(&bytes);

        let (front_matter, body) = split_front_matter(&raw);

        let title = front_matter
            .get("title")
            .filter(|t| !t.is_empty())
            .cloned()
            .or_else(|| first_heading(body))
            .unwrap_or_else(|| file_stem(path));

        let mut metadata = Map::new();
        metadata.insert(
            "has_frontmatter".to_string(),
            Value::Bool(!front_matter.is_empty()),
        );
        if !front_matter.is_empty() {
            let fm: Map<String, Value> = front_matter
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            metadata.insert("frontmatter".to_string(), Value::Object(fm));
            for key in PROMOTED_KEYS {
                if let Some(v) = front_matter.get(*key) {
                    metadata.insert(key.to_string(), Value::String(v.clone()));
                }
            }
        }

        let mut doc = base_document(path, source, self.name(), body.to_string())?;
        doc.title = Some(title);
        doc.metadata = metadata;

        Ok(doc)
    }
}

/// Split a leading `---` front-matter block from the body. Returns an empty
/// map and the whole input when there is no well-formed block.
fn split_front_matter(raw: &str) -> (BTreeMap<String, String>, &str) {
    let mut map = BTreeMap::new();

    let Some(rest) = raw.strip_prefix("---").and_then(|r| {
        r.strip_prefix('\n')
            .or_else(|| r.strip_prefix("\r\n"))
    }) else {
        return (map, raw);
    };

    let Some(end) = rest.find("\n---") else {
        return (map, raw);
    };
    let (block, after) = rest.split_at(end);

    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim().trim_matches('"').trim_matches('\'');
            if !key.is_empty() {
                map.insert(key.to_string(), value.to_string());
            }
        }
    }

    // Skip the closing delimiter and its line ending.
    let body = after["\n---".len()..].trim_start_matches(['\r', '\n']);
    (map, body)
}

/// First `# ` heading in the body, if any.
fn first_heading(body: &str) -> Option<String> {
    for line in body.lines() {
        let line = line.trim();
        if let Some(heading) = line.strip_prefix("# ") {
            let heading = heading.trim();
            if !heading.is_empty() {
                return Some(heading.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn source() -> SourceInfo {
        SourceInfo {
            source_id: "docs".to_string(),
            source_name: "Docs".to_string(),
        }
    }

    fn extractor() -> MarkdownExtractor {
        MarkdownExtractor::new(10 * 1024 * 1024, Duration::from_secs(5))
    }

    #[test]
    fn front_matter_title_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("post.md");
        fs::write(
            &path,
            "---\ntitle: Foo\nauthor: Ada\ntags: [a, b]\n---\n# Other heading\n\nBody text.\n",
        )
        .unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Foo"));
        assert_eq!(doc.metadata["has_frontmatter"], true);
        assert_eq!(doc.metadata["author"], "Ada");
        assert!(!doc.content.contains("title: Foo"));
        assert!(doc.content.contains("Body text."));
    }

    #[test]
    fn heading_title_when_no_front_matter() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("guide.md");
        fs::write(&path, "intro line\n\n# Install Guide\n\ntext\n").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("Install Guide"));
        assert_eq!(doc.metadata["has_frontmatter"], false);
    }

    #[test]
    fn stem_title_when_nothing_else() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        fs::write(&path, "just text, no heading\n").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.title.as_deref(), Some("notes"));
    }

    #[test]
    fn unterminated_front_matter_is_treated_as_body() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.md");
        fs::write(&path, "---\ntitle: Dangling\nno closing delimiter\n").unwrap();

        let doc = extractor().extract(&path, &source()).unwrap();
        assert_eq!(doc.metadata["has_frontmatter"], false);
        assert!(doc.content.contains("title: Dangling"));
    }
}
