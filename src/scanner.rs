//! Filesystem scanner with glob pattern filtering.
//!
//! Walks a source root and yields the sorted set of regular files matching
//! the source's include/exclude patterns. Output order is lexicographic by
//! absolute path string so consecutive runs are deterministic and diffable.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Directories and files no one wants indexed unless they ask: version
/// control, dependency and build output trees, IDE state, OS artifacts,
/// temp files. Applied only when a source has no explicit exclude list;
/// an explicitly empty list means "exclude nothing".
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    // Version control
    "**/.git/**",
    "**/.svn/**",
    "**/.hg/**",
    // Dependencies
    "**/node_modules/**",
    "**/venv/**",
    "**/.venv/**",
    "**/env/**",
    "**/virtualenv/**",
    "**/__pycache__/**",
    "**/vendor/**",
    // Build outputs
    "**/dist/**",
    "**/build/**",
    "**/target/**",
    "**/.next/**",
    "**/.nuxt/**",
    // IDE
    "**/.vscode/**",
    "**/.idea/**",
    "**/.vs/**",
    // OS
    "**/.DS_Store",
    "**/Thumbs.db",
    "**/desktop.ini",
    // Temporary files
    "**/*.tmp",
    "**/*.temp",
    "**/.cache/**",
];

pub struct FileScanner {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl FileScanner {
    /// Build a scanner for `root`.
    ///
    /// Fails fast if the root does not exist or is not a directory.
    /// A malformed individual glob logs a warning and is dropped; it never
    /// aborts the scan.
    pub fn new(
        root: &Path,
        include_patterns: Option<&[String]>,
        exclude_patterns: Option<&[String]>,
        follow_symlinks: bool,
    ) -> Result<Self> {
        let root = root
            .canonicalize()
            .with_context(|| format!("Source root does not exist: {}", root.display()))?;
        if !root.is_dir() {
            bail!("Source root is not a directory: {}", root.display());
        }

        let include = match include_patterns {
            Some(patterns) if !patterns.is_empty() => build_globset(patterns),
            _ => build_globset(&["**/*".to_string()]),
        };

        let exclude = match exclude_patterns {
            Some(patterns) => build_globset(patterns),
            None => build_globset(
                &DEFAULT_EXCLUDE_PATTERNS
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>(),
            ),
        };

        Ok(Self {
            root,
            include,
            exclude,
            follow_symlinks,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the root and return matching regular files, sorted by absolute
    /// path string. Directories are never yielded; symlinks are skipped
    /// unless the scanner follows them. Unreadable entries are logged and
    /// skipped rather than failing the scan.
    pub fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root).follow_links(self.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry during scan");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !self.follow_symlinks && entry.path_is_symlink() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);

            if self.is_excluded(relative) {
                continue;
            }
            if !self.include.is_match(relative) {
                continue;
            }

            files.push(path.to_path_buf());
        }

        files.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        files
    }

    /// A path is excluded when it, or any ancestor directory relative to the
    /// root, matches an exclude pattern. The ancestor check is what makes a
    /// bare directory pattern like `**/.git` cover everything beneath it.
    fn is_excluded(&self, relative: &Path) -> bool {
        if self.exclude.is_match(relative) {
            return true;
        }
        let mut ancestor = relative.parent();
        while let Some(dir) = ancestor {
            if !dir.as_os_str().is_empty() && self.exclude.is_match(dir) {
                return true;
            }
            ancestor = dir.parent();
        }
        false
    }
}

fn build_globset(patterns: &[String]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "ignoring malformed glob pattern");
            }
        }
    }
    builder.build().unwrap_or_else(|e| {
        warn!(error = %e, "glob set build failed; matching nothing");
        GlobSet::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup_tree() -> TempDir {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();

        fs::create_dir_all(root.join("docs")).unwrap();
        fs::create_dir_all(root.join("code")).unwrap();
        fs::create_dir_all(root.join("node_modules/pkg")).unwrap();
        fs::create_dir_all(root.join(".git")).unwrap();

        fs::write(root.join("README.md"), "# README").unwrap();
        fs::write(root.join("docs/guide.md"), "# Guide").unwrap();
        fs::write(root.join("docs/api.pdf"), "").unwrap();
        fs::write(root.join("code/main.py"), "print('hello')").unwrap();
        fs::write(root.join("code/notes.txt"), "notes").unwrap();
        fs::write(root.join("node_modules/pkg/package.json"), "{}").unwrap();
        fs::write(root.join(".git/config"), "").unwrap();
        fs::write(root.join("scratch.tmp"), "x").unwrap();

        tmp
    }

    fn names(files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn default_excludes_hide_vcs_and_deps() {
        let tmp = setup_tree();
        let scanner = FileScanner::new(tmp.path(), None, None, false).unwrap();
        let files = scanner.scan();
        let names = names(&files);

        assert!(names.contains(&"README.md".to_string()));
        assert!(names.contains(&"main.py".to_string()));
        assert!(!names.contains(&"package.json".to_string()));
        assert!(!names.contains(&"config".to_string()));
        assert!(!names.contains(&"scratch.tmp".to_string()));
    }

    #[test]
    fn empty_exclude_list_excludes_nothing() {
        let tmp = setup_tree();
        let scanner = FileScanner::new(tmp.path(), None, Some(&[]), false).unwrap();
        let names = names(&scanner.scan());

        assert!(names.contains(&"package.json".to_string()));
        assert!(names.contains(&"config".to_string()));
        assert!(names.contains(&"scratch.tmp".to_string()));
    }

    #[test]
    fn include_patterns_filter() {
        let tmp = setup_tree();
        let include = vec!["**/*.md".to_string()];
        let scanner = FileScanner::new(tmp.path(), Some(&include), None, false).unwrap();
        let names = names(&scanner.scan());

        assert_eq!(names.len(), 2);
        assert!(names.contains(&"README.md".to_string()));
        assert!(names.contains(&"guide.md".to_string()));
    }

    #[test]
    fn output_is_sorted_by_absolute_path() {
        let tmp = setup_tree();
        let scanner = FileScanner::new(tmp.path(), None, Some(&[]), false).unwrap();
        let files = scanner.scan();
        let mut sorted = files.clone();
        sorted.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        assert_eq!(files, sorted);
    }

    #[test]
    fn directories_matching_include_are_not_yielded() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("thing.md")).unwrap();
        fs::write(tmp.path().join("thing.md/inner.md"), "x").unwrap();

        let include = vec!["**/*.md".to_string()];
        let scanner = FileScanner::new(tmp.path(), Some(&include), None, false).unwrap();
        let files = scanner.scan();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("thing.md/inner.md"));
    }

    #[test]
    fn missing_root_fails_fast() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("does-not-exist");
        assert!(FileScanner::new(&missing, None, None, false).is_err());
    }

    #[test]
    fn malformed_glob_is_skipped_not_fatal() {
        let tmp = setup_tree();
        let include = vec!["**/*.md".to_string(), "[invalid".to_string()];
        let scanner = FileScanner::new(tmp.path(), Some(&include), None, false).unwrap();
        let names = names(&scanner.scan());
        assert!(names.contains(&"README.md".to_string()));
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_skipped_by_default() {
        let tmp = setup_tree();
        std::os::unix::fs::symlink(
            tmp.path().join("README.md"),
            tmp.path().join("link.md"),
        )
        .unwrap();

        let scanner = FileScanner::new(tmp.path(), None, Some(&[]), false).unwrap();
        let default_names = names(&scanner.scan());
        assert!(!default_names.contains(&"link.md".to_string()));

        let follower = FileScanner::new(tmp.path(), None, Some(&[]), true).unwrap();
        let followed_names = names(&follower.scan());
        assert!(followed_names.contains(&"link.md".to_string()));
    }
}
