//! Local-disk providers: gitignore-aware text search and `file://` reads.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use quarry_types::search::{
    IncludeExcludePatterns, PatternKind, TextSearchParams, TextSearchResult,
};
use regex::{Regex, RegexBuilder};
use tokio::task;
use url::Url;

use crate::search::{ProvideFut, SearchError, TextSearchProvider};
use crate::services::{FileProvider, FileSystemError, ReadFileFut};

/// Text-search provider over a directory tree.
///
/// Walks the root honoring gitignore rules, filters relative paths through
/// the regexp include/exclude patterns, and matches file content against
/// the query pattern. Results are `file://` URIs in deterministic path
/// order, capped at `max_results`.
pub struct FsTextSearchProvider {
    root: PathBuf,
}

impl FsTextSearchProvider {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn search(root: &Path, params: &TextSearchParams) -> Result<Vec<TextSearchResult>, SearchError> {
        let pattern = compile_query(params)?;
        let path_filter = PathFilter::compile(params.options.files.as_ref())?;
        let max_results = params.options.max_results.unwrap_or(usize::MAX);

        // Gitignore rules apply whether or not the root is a repository.
        let mut files: Vec<PathBuf> = WalkBuilder::new(root)
            .require_git(false)
            .build()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
            .map(ignore::DirEntry::into_path)
            .collect();
        files.sort();

        let mut out = Vec::new();
        for path in files {
            if out.len() >= max_results {
                break;
            }
            let relative = relative_path_string(root, &path);
            if !path_filter.allows(&relative) {
                continue;
            }
            // Binary or unreadable files are skipped, not reported.
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            if pattern.is_match(&content)
                && let Ok(uri) = Url::from_file_path(&path)
            {
                out.push(TextSearchResult::new(uri));
            }
        }
        Ok(out)
    }
}

impl TextSearchProvider for FsTextSearchProvider {
    fn provide<'a>(&'a self, params: TextSearchParams) -> ProvideFut<'a> {
        // The walk and file reads are synchronous; keep them off the
        // async executor.
        let root = self.root.clone();
        Box::pin(async move {
            task::spawn_blocking(move || Self::search(&root, &params))
                .await
                .map_err(|err| SearchError::Provider(err.to_string()))?
        })
    }
}

fn compile_query(params: &TextSearchParams) -> Result<Regex, SearchError> {
    let query = &params.query;
    let mut pattern = match query.kind {
        PatternKind::Literal => regex::escape(&query.pattern),
        PatternKind::Regexp => query.pattern.clone(),
    };
    if query.is_word_match {
        pattern = format!(r"\b(?:{pattern})\b");
    }
    RegexBuilder::new(&pattern)
        .case_insensitive(!query.is_case_sensitive)
        .build()
        .map_err(|err| SearchError::InvalidPattern(err.to_string()))
}

struct PathFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl PathFilter {
    fn compile(patterns: Option<&IncludeExcludePatterns>) -> Result<Self, SearchError> {
        let Some(patterns) = patterns else {
            return Ok(Self {
                includes: Vec::new(),
                excludes: Vec::new(),
            });
        };
        if patterns.kind != PatternKind::Regexp {
            return Err(SearchError::UnsupportedPatternKind(patterns.kind));
        }
        let compile_side = |side: &[String]| -> Result<Vec<Regex>, SearchError> {
            side.iter()
                .map(|p| Regex::new(p).map_err(|err| SearchError::InvalidPattern(err.to_string())))
                .collect()
        };
        Ok(Self {
            includes: compile_side(&patterns.includes)?,
            excludes: compile_side(&patterns.excludes)?,
        })
    }

    fn allows(&self, relative: &str) -> bool {
        if !self.includes.is_empty() && !self.includes.iter().any(|re| re.is_match(relative)) {
            return false;
        }
        !self.excludes.iter().any(|re| re.is_match(relative))
    }
}

/// Relative path with forward slashes, the form the patterns match against.
fn relative_path_string(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let text = relative.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        text.into_owned()
    } else {
        text.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// File provider for `file://` URIs backed by the real file system.
pub struct LocalFileSystem;

impl LocalFileSystem {
    async fn read(uri: &Url) -> Result<String, FileSystemError> {
        if uri.scheme() != "file" {
            return Err(FileSystemError::UnsupportedUri {
                uri: uri.clone(),
                reason: format!("expected file:// scheme, got {}", uri.scheme()),
            });
        }
        let path = uri
            .to_file_path()
            .map_err(|()| FileSystemError::UnsupportedUri {
                uri: uri.clone(),
                reason: "uri does not name a local path".to_string(),
            })?;
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FileSystemError::NotFound(uri.clone()))
            }
            Err(err) => Err(FileSystemError::Read {
                uri: uri.clone(),
                message: err.to_string(),
            }),
        }
    }
}

impl FileProvider for LocalFileSystem {
    fn read_file<'a>(&'a self, uri: &'a Url) -> ReadFileFut<'a> {
        Box::pin(Self::read(uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_types::search::{TextSearchOptions, TextSearchQuery};
    use std::fs;
    use tempfile::TempDir;

    fn fixture_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("src")).unwrap();
        fs::create_dir_all(dir.path().join("target")).unwrap();
        fs::write(dir.path().join("src/main.rs"), "fn main() { needle(); }\n").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "pub fn needle() {}\n").unwrap();
        fs::write(dir.path().join("README.md"), "no match here\n").unwrap();
        fs::write(dir.path().join("target/out.rs"), "needle in build output\n").unwrap();
        fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        dir
    }

    fn file_names(results: &[TextSearchResult]) -> Vec<String> {
        results
            .iter()
            .map(|r| {
                r.uri
                    .path_segments()
                    .and_then(|mut s| s.next_back())
                    .unwrap()
                    .to_string()
            })
            .collect()
    }

    async fn run(
        dir: &TempDir,
        query: TextSearchQuery,
        options: TextSearchOptions,
    ) -> Vec<TextSearchResult> {
        FsTextSearchProvider::new(dir.path())
            .provide(TextSearchParams::new(query).with_options(options))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn literal_search_skips_gitignored_files() {
        let dir = fixture_tree();
        let results = run(
            &dir,
            TextSearchQuery::literal("needle"),
            TextSearchOptions::default(),
        )
        .await;
        assert_eq!(file_names(&results), ["lib.rs", "main.rs"]);
    }

    #[tokio::test]
    async fn regexp_search_matches_patterns() {
        let dir = fixture_tree();
        let results = run(
            &dir,
            TextSearchQuery::regexp(r"fn \w+\(\)"),
            TextSearchOptions::default(),
        )
        .await;
        assert_eq!(file_names(&results), ["lib.rs", "main.rs"]);
    }

    #[tokio::test]
    async fn literal_pattern_is_not_treated_as_regex() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "literal f.o text\n").unwrap();
        fs::write(dir.path().join("b.txt"), "foo would match a regex\n").unwrap();
        let results = run(
            &dir,
            TextSearchQuery::literal("f.o"),
            TextSearchOptions::default(),
        )
        .await;
        assert_eq!(file_names(&results), ["a.txt"]);
    }

    #[tokio::test]
    async fn case_sensitivity_is_honored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "Needle\n").unwrap();

        let insensitive = run(
            &dir,
            TextSearchQuery::literal("needle"),
            TextSearchOptions::default(),
        )
        .await;
        assert_eq!(insensitive.len(), 1);

        let mut sensitive_query = TextSearchQuery::literal("needle");
        sensitive_query.is_case_sensitive = true;
        let sensitive = run(&dir, sensitive_query, TextSearchOptions::default()).await;
        assert!(sensitive.is_empty());
    }

    #[tokio::test]
    async fn include_exclude_patterns_filter_relative_paths() {
        let dir = fixture_tree();
        let options = TextSearchOptions {
            files: Some(IncludeExcludePatterns::regexp(
                vec![r"\.rs$".into()],
                vec!["main".into()],
            )),
            ..Default::default()
        };
        let results = run(&dir, TextSearchQuery::literal("needle"), options).await;
        assert_eq!(file_names(&results), ["lib.rs"]);
    }

    #[tokio::test]
    async fn max_results_caps_output() {
        let dir = fixture_tree();
        let options = TextSearchOptions {
            max_results: Some(1),
            ..Default::default()
        };
        let results = run(&dir, TextSearchQuery::literal("needle"), options).await;
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn invalid_regexp_is_a_typed_error() {
        let dir = TempDir::new().unwrap();
        let err = FsTextSearchProvider::new(dir.path())
            .provide(TextSearchParams::new(TextSearchQuery::regexp("(unclosed")))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidPattern(_)));
    }

    #[tokio::test]
    async fn local_file_system_reads_and_reports_not_found() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "hello\n").unwrap();

        let ok_uri = Url::from_file_path(dir.path().join("a.txt")).unwrap();
        assert_eq!(LocalFileSystem.read_file(&ok_uri).await.unwrap(), "hello\n");

        let missing_uri = Url::from_file_path(dir.path().join("missing.txt")).unwrap();
        let err = LocalFileSystem.read_file(&missing_uri).await.unwrap_err();
        assert!(matches!(err, FileSystemError::NotFound(_)));

        let wrong_scheme = Url::parse("git://repo?rev#path").unwrap();
        let err = LocalFileSystem.read_file(&wrong_scheme).await.unwrap_err();
        assert!(matches!(err, FileSystemError::UnsupportedUri { .. }));
    }
}
