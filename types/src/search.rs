//! Text-search query, option, and result values.

use serde::{Deserialize, Serialize};
use url::Url;

/// How a pattern string is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    #[default]
    Literal,
    Regexp,
}

/// A text-search query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchQuery {
    pub pattern: String,
    #[serde(rename = "type", default)]
    pub kind: PatternKind,
    #[serde(default)]
    pub is_case_sensitive: bool,
    #[serde(default)]
    pub is_word_match: bool,
}

impl TextSearchQuery {
    #[must_use]
    pub fn literal(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            kind: PatternKind::Literal,
            is_case_sensitive: false,
            is_word_match: false,
        }
    }

    #[must_use]
    pub fn regexp(pattern: impl Into<String>) -> Self {
        Self {
            kind: PatternKind::Regexp,
            ..Self::literal(pattern)
        }
    }
}

/// Include/exclude pattern lists applied to resource paths or repository
/// names. `kind` governs how each pattern string is interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncludeExcludePatterns {
    pub includes: Vec<String>,
    pub excludes: Vec<String>,
    #[serde(rename = "type")]
    pub kind: PatternKind,
}

impl IncludeExcludePatterns {
    #[must_use]
    pub fn regexp(includes: Vec<String>, excludes: Vec<String>) -> Self {
        Self {
            includes,
            excludes,
            kind: PatternKind::Regexp,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }
}

/// Scope and limits for one search request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextSearchOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<IncludeExcludePatterns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repositories: Option<IncludeExcludePatterns>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

/// The full parameter set of one `findTextInFiles` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextSearchParams {
    pub query: TextSearchQuery,
    #[serde(default)]
    pub options: TextSearchOptions,
}

impl TextSearchParams {
    #[must_use]
    pub fn new(query: TextSearchQuery) -> Self {
        Self {
            query,
            options: TextSearchOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: TextSearchOptions) -> Self {
        self.options = options;
        self
    }
}

/// One resource matching a text search. The URI is the match identity used
/// for deduplication across providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSearchResult {
    pub uri: Url,
}

impl TextSearchResult {
    #[must_use]
    pub fn new(uri: Url) -> Self {
        Self { uri }
    }
}
