//! Platform-backed providers: text search and file reads over the GraphQL
//! capability.

use std::sync::Arc;

use quarry_types::search::{
    IncludeExcludePatterns, PatternKind, TextSearchParams, TextSearchResult,
};
use serde_json::{Value, json};
use thiserror::Error;
use url::Url;

use crate::graphql::{GraphQlClient, GraphQlError};
use crate::search::{ProvideFut, SearchError, TextSearchProvider};
use crate::services::{FileProvider, FileSystemError, ReadFileFut};

const SEARCH_QUERY: &str = "\
query Search($query: String!) {
    search(query: $query) {
        results {
            results {
                __typename
                ... on FileMatch {
                    file {
                        path
                        repository { name }
                        commit { oid }
                    }
                }
            }
        }
    }
}";

const READ_FILE_QUERY: &str = "\
query ReadFile($repo: String!, $rev: String!, $path: String!) {
    repository(name: $repo) {
        commit(rev: $rev) {
            blob(path: $path) {
                content
            }
        }
    }
}";

/// A platform repository URI: `git://<repo>?<rev>#<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoUri {
    pub repo: String,
    pub rev: String,
    pub path: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoUriError {
    #[error("expected git:// scheme, got {0}")]
    Scheme(String),
    #[error("repo uri has no repository name")]
    MissingRepo,
    #[error("repo uri has no revision")]
    MissingRev,
    #[error("repo uri has no file path")]
    MissingPath,
    #[error("repo uri components do not form a valid url: {0}")]
    Unrepresentable(#[from] url::ParseError),
}

impl RepoUri {
    pub fn parse(uri: &Url) -> Result<Self, RepoUriError> {
        if uri.scheme() != "git" {
            return Err(RepoUriError::Scheme(uri.scheme().to_string()));
        }
        let host = uri.host_str().unwrap_or("");
        let path_part = uri.path().trim_end_matches('/');
        let repo = format!("{host}{path_part}");
        if repo.is_empty() {
            return Err(RepoUriError::MissingRepo);
        }
        let rev = uri
            .query()
            .filter(|rev| !rev.is_empty())
            .ok_or(RepoUriError::MissingRev)?
            .to_string();
        let path = uri
            .fragment()
            .filter(|path| !path.is_empty())
            .ok_or(RepoUriError::MissingPath)?
            .to_string();
        Ok(Self { repo, rev, path })
    }

    pub fn to_url(&self) -> Result<Url, RepoUriError> {
        let raw = format!("git://{}?{}#{}", self.repo, self.rev, self.path);
        Ok(Url::parse(&raw)?)
    }
}

/// Text-search provider that answers through the platform search endpoint.
///
/// Formats the query with `repo:` / `file:` / `count:` filters, issues it
/// over the GraphQL capability, and maps file matches to `git://` repo
/// URIs.
pub struct GraphQlSearchProvider {
    client: Arc<dyn GraphQlClient>,
}

impl GraphQlSearchProvider {
    #[must_use]
    pub fn new(client: Arc<dyn GraphQlClient>) -> Self {
        Self { client }
    }

    /// Build the platform query string for one request.
    fn build_query_string(params: &TextSearchParams) -> Result<String, SearchError> {
        let mut parts: Vec<String> = Vec::new();
        if let Some(repositories) = &params.options.repositories
            && let Some(part) = format_include_exclude("repo:", repositories)?
        {
            parts.push(part);
        }
        if let Some(files) = &params.options.files
            && let Some(part) = format_include_exclude("file:", files)?
        {
            parts.push(part);
        }
        if let Some(max_results) = params.options.max_results {
            parts.push(format!("count:{max_results}"));
        }
        parts.push(params.query.pattern.clone());
        Ok(parts.join(" "))
    }

    async fn search(&self, params: TextSearchParams) -> Result<Vec<TextSearchResult>, SearchError> {
        let query = Self::build_query_string(&params)?;
        let data = self
            .client
            .request(SEARCH_QUERY, json!({ "query": query }))
            .await?;

        let results = data
            .pointer("/search/results/results")
            .and_then(Value::as_array)
            .ok_or_else(GraphQlError::missing_data)?;

        let mut out = Vec::new();
        for result in results {
            if result.get("__typename").and_then(Value::as_str) != Some("FileMatch") {
                continue;
            }
            let Some(file) = result.get("file") else {
                continue;
            };
            let (Some(path), Some(repo), Some(oid)) = (
                file.get("path").and_then(Value::as_str),
                file.pointer("/repository/name").and_then(Value::as_str),
                file.pointer("/commit/oid").and_then(Value::as_str),
            ) else {
                tracing::debug!("skipping file match with missing fields");
                continue;
            };
            let uri = RepoUri {
                repo: repo.to_string(),
                rev: oid.to_string(),
                path: path.to_string(),
            };
            match uri.to_url() {
                Ok(url) => out.push(TextSearchResult::new(url)),
                Err(err) => {
                    tracing::debug!(%err, "skipping file match with unrepresentable uri");
                }
            }
        }
        Ok(out)
    }
}

impl TextSearchProvider for GraphQlSearchProvider {
    fn provide<'a>(&'a self, params: TextSearchParams) -> ProvideFut<'a> {
        Box::pin(self.search(params))
    }
}

/// Format one include/exclude pattern set into platform filters.
///
/// Only regexp-kind patterns and at most one pattern per side are
/// representable in the platform query language.
fn format_include_exclude(
    keyword: &str,
    patterns: &IncludeExcludePatterns,
) -> Result<Option<String>, SearchError> {
    if patterns.kind != PatternKind::Regexp {
        return Err(SearchError::UnsupportedPatternKind(patterns.kind));
    }
    let format_side = |prefix: &str, side: &[String]| -> Result<Option<String>, SearchError> {
        match side {
            [] => Ok(None),
            [only] => Ok(Some(format!("{prefix}{keyword}{only}"))),
            _ => Err(SearchError::MultiplePatterns),
        }
    };
    let parts: Vec<String> = [
        format_side("", &patterns.includes)?,
        format_side("-", &patterns.excludes)?,
    ]
    .into_iter()
    .flatten()
    .collect();
    Ok(if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    })
}

/// File provider resolving `git://repo?rev#path` URIs through the platform
/// blob endpoint.
pub struct GraphQlFileSystem {
    client: Arc<dyn GraphQlClient>,
}

impl GraphQlFileSystem {
    #[must_use]
    pub fn new(client: Arc<dyn GraphQlClient>) -> Self {
        Self { client }
    }

    async fn read(&self, uri: &Url) -> Result<String, FileSystemError> {
        let parsed = RepoUri::parse(uri).map_err(|err| FileSystemError::UnsupportedUri {
            uri: uri.clone(),
            reason: err.to_string(),
        })?;
        let data = self
            .client
            .request(
                READ_FILE_QUERY,
                json!({ "repo": parsed.repo, "rev": parsed.rev, "path": parsed.path }),
            )
            .await
            .map_err(|err| FileSystemError::Read {
                uri: uri.clone(),
                message: err.to_string(),
            })?;

        data.pointer("/repository/commit/blob/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| FileSystemError::NotFound(uri.clone()))
    }
}

impl FileProvider for GraphQlFileSystem {
    fn read_file<'a>(&'a self, uri: &'a Url) -> ReadFileFut<'a> {
        Box::pin(self.read(uri))
    }
}
