//! Directory scanner
//!
//! Walks a root with `walkdir` in lexical order and yields candidate files
//! lazily. Exclude patterns are applied before the extension allow-list, so an
//! excluded file is never yielded whatever its extension.

use globset::{GlobBuilder, GlobMatcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Extensions considered when no explicit list is configured
pub const DEFAULT_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "pptx", "xlsx", "xls", "png", "jpg", "jpeg", "html", "htm", "csv", "json",
    "xml", "md", "txt", "zip",
];

/// Exclude patterns used when none are configured
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &["*.DS_Store", "*.gitkeep", ".git/**", "__MACOSX/**"];

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("source directory not found: {0}")]
    RootNotFound(PathBuf),
    #[error("invalid exclude pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
    /// Symlinks, entries that vanished mid-walk, unreadable directories
    #[error("skipped {path}: {message}")]
    Transient { path: PathBuf, message: String },
}

impl ScanError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// A compiled exclude pattern
#[derive(Debug, Clone)]
struct ExcludeRule {
    /// Matches the whole relative path, or the file name for name-only rules
    matcher: GlobMatcher,
    /// For path rules, matches any single directory component (`.git` of `.git/**`)
    component: Option<GlobMatcher>,
}

impl ExcludeRule {
    fn compile(raw: &str) -> Result<Self, ScanError> {
        let pattern = raw.trim().trim_start_matches('/');
        let is_path_rule = pattern.contains('/') || pattern.contains("**");

        let matcher = build_matcher(pattern).map_err(|message| ScanError::Pattern {
            pattern: raw.to_string(),
            message,
        })?;

        let component = if is_path_rule {
            match pattern.split('/').next().unwrap_or_default() {
                "" | "**" => None,
                head => Some(build_matcher(head).map_err(|message| ScanError::Pattern {
                    pattern: raw.to_string(),
                    message,
                })?),
            }
        } else {
            None
        };

        Ok(Self { matcher, component })
    }
}

fn build_matcher(pattern: &str) -> Result<GlobMatcher, String> {
    GlobBuilder::new(pattern)
        .literal_separator(false)
        .build()
        .map(|g| g.compile_matcher())
        .map_err(|e| e.to_string())
}

/// Configured scanner; `scan` may be called any number of times
#[derive(Debug, Clone)]
pub struct Scanner {
    root: PathBuf,
    extensions: HashSet<String>,
    path_rules: Vec<ExcludeRule>,
    name_rules: Vec<ExcludeRule>,
}

impl Scanner {
    /// Build a scanner; extensions may be given with or without the leading dot
    pub fn new<S: AsRef<str>>(
        root: &Path,
        extensions: &[S],
        exclude_patterns: &[S],
    ) -> Result<Self, ScanError> {
        let extensions = extensions
            .iter()
            .map(|e| normalize_extension(e.as_ref()))
            .filter(|e| !e.is_empty())
            .collect();

        let mut path_rules = Vec::new();
        let mut name_rules = Vec::new();
        for raw in exclude_patterns {
            let raw = raw.as_ref();
            let rule = ExcludeRule::compile(raw)?;
            if raw.contains('/') || raw.contains("**") {
                path_rules.push(rule);
            } else {
                name_rules.push(rule);
            }
        }

        Ok(Self {
            root: root.to_path_buf(),
            extensions,
            path_rules,
            name_rules,
        })
    }

    /// Scanner with the default allow-list and exclude patterns
    #[cfg(test)]
    pub(crate) fn with_defaults(root: &Path) -> Result<Self, ScanError> {
        Self::new(root, DEFAULT_EXTENSIONS, DEFAULT_EXCLUDE_PATTERNS)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a fresh, lazy walk of the root
    pub fn scan(&self) -> Result<Scan<'_>, ScanError> {
        if !self.root.is_dir() {
            return Err(ScanError::RootNotFound(self.root.clone()));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Ok(Scan {
            scanner: self,
            walker,
        })
    }

    /// Whether a file path relative to the root matches any exclude pattern
    pub fn is_excluded(&self, relative: &Path) -> bool {
        if self.is_dir_excluded(relative) {
            return true;
        }

        let name = relative
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.name_rules.iter().any(|rule| rule.matcher.is_match(&name))
    }

    /// Directories are pruned by path rules only; name rules target files
    fn is_dir_excluded(&self, relative: &Path) -> bool {
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        self.path_rules.iter().any(|rule| {
            rule.matcher.is_match(&rel_str)
                || rule.component.as_ref().is_some_and(|component| {
                    relative
                        .components()
                        .any(|c| component.is_match(c.as_os_str().to_string_lossy().as_ref()))
                })
        })
    }

    /// Whether the file's extension is on the allow-list
    pub fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .map(|e| self.extensions.contains(&e.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    fn relative<'p>(&self, path: &'p Path) -> &'p Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

fn normalize_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_lowercase()
}

/// Lazy iterator over candidate files in lexical path order
pub struct Scan<'a> {
    scanner: &'a Scanner,
    walker: walkdir::IntoIter,
}

impl Iterator for Scan<'_> {
    type Item = Result<PathBuf, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    return Some(Err(ScanError::Transient {
                        path,
                        message: e.to_string(),
                    }));
                }
            };

            if entry.depth() == 0 {
                continue;
            }

            let path = entry.path();
            let relative = self.scanner.relative(path).to_path_buf();

            if entry.file_type().is_dir() {
                if self.scanner.is_dir_excluded(&relative) {
                    debug!(path = %relative.display(), "Excluded directory");
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if self.scanner.is_excluded(&relative) {
                debug!(path = %relative.display(), "Excluded");
                continue;
            }

            if entry.path_is_symlink() {
                return Some(Err(ScanError::Transient {
                    path: path.to_path_buf(),
                    message: "symbolic links are not followed".to_string(),
                }));
            }

            if !self.scanner.is_allowed(path) {
                debug!(path = %relative.display(), "Extension not in allow-list");
                continue;
            }

            let absolute = if path.is_absolute() {
                path.to_path_buf()
            } else {
                match std::path::absolute(path) {
                    Ok(p) => p,
                    Err(e) => {
                        return Some(Err(ScanError::Transient {
                            path: path.to_path_buf(),
                            message: e.to_string(),
                        }))
                    }
                }
            };

            return Some(Ok(absolute));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();

        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("__MACOSX")).unwrap();

        fs::write(root.join("a.md"), "alpha").unwrap();
        fs::write(root.join("b/c.PDF"), "pdf").unwrap();
        fs::write(root.join("b/nested/d.txt"), "delta").unwrap();
        fs::write(root.join("b/skip.exe"), "bin").unwrap();
        fs::write(root.join(".git/objects/e.txt"), "git").unwrap();
        fs::write(root.join("__MACOSX/f.txt"), "mac").unwrap();
        fs::write(root.join("notes.txt.DS_Store"), "ds").unwrap();

        dir
    }

    fn names(scanner: &Scanner) -> Vec<String> {
        scanner
            .scan()
            .unwrap()
            .map(|r| {
                r.unwrap()
                    .strip_prefix(scanner.root())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn test_scan_defaults_in_lexical_order() {
        let dir = create_test_dir();
        let scanner = Scanner::with_defaults(dir.path()).unwrap();

        assert_eq!(names(&scanner), vec!["a.md", "b/c.PDF", "b/nested/d.txt"]);
    }

    #[test]
    fn test_scan_is_restartable() {
        let dir = create_test_dir();
        let scanner = Scanner::with_defaults(dir.path()).unwrap();

        let first: Vec<_> = scanner.scan().unwrap().take(1).collect::<Result<_, _>>().unwrap();
        let all: Vec<_> = scanner.scan().unwrap().collect::<Result<_, _>>().unwrap();
        assert_eq!(first[0], all[0]);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_exclude_wins_over_extension() {
        let dir = create_test_dir();
        let scanner = Scanner::new(dir.path(), &["txt", "md"], &["*.md", "nested/**"]).unwrap();

        // .git is no longer excluded with a custom list, but nested/ and *.md are
        assert_eq!(names(&scanner), vec![".git/objects/e.txt", "__MACOSX/f.txt"]);
    }

    #[test]
    fn test_explicit_extensions_accept_dots() {
        let dir = create_test_dir();
        let scanner = Scanner::new(dir.path(), &[".PDF"], &[]).unwrap();
        assert_eq!(names(&scanner), vec!["b/c.PDF"]);
    }

    #[test]
    fn test_paths_are_absolute() {
        let dir = create_test_dir();
        let scanner = Scanner::with_defaults(dir.path()).unwrap();
        assert!(scanner.scan().unwrap().all(|p| p.unwrap().is_absolute()));
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let scanner = Scanner::with_defaults(&dir.path().join("nope")).unwrap();
        assert!(matches!(scanner.scan(), Err(ScanError::RootNotFound(_))));
    }

    #[test]
    fn test_invalid_pattern() {
        let dir = TempDir::new().unwrap();
        let result = Scanner::new(dir.path(), &["txt"], &["[unclosed"]);
        assert!(matches!(result, Err(ScanError::Pattern { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_reported_as_transient() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("link.txt")).unwrap();

        let scanner = Scanner::with_defaults(dir.path()).unwrap();
        let results: Vec<_> = scanner.scan().unwrap().collect();

        assert_eq!(results.len(), 2);
        assert!(matches!(&results[0], Err(e) if e.is_transient()));
        assert!(results[1].is_ok());
    }
}
