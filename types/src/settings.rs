//! Thread settings and pull-request state entities.
//!
//! These mirror the JSON stored in thread settings documents, so every wire
//! name is camelCase and optional fields stay off the wire when unset.

use serde::{Deserialize, Serialize};

/// Settings attached to one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThreadSettings {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
    pub create_pull_requests: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pull_request_template: Option<PullRequestTemplate>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub pull_requests: Vec<PullRequest>,
}

/// Template fields applied to pull requests a thread creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullRequestTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields common to every pull-request status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequestBase {
    pub repo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,
}

/// Fields present once a pull request exists upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedPullRequest {
    #[serde(flatten)]
    pub base: PullRequestBase,
    pub number: u64,
    pub title: String,
    pub comments_count: u64,
    pub updated_at: String,
    pub updated_by: String,
}

/// State of one pull request tracked by a thread.
///
/// `status` discriminates the union: a pending pull request has not been
/// pushed yet and carries no upstream identity; every other status does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PullRequest {
    Pending(PullRequestBase),
    Open(SubmittedPullRequest),
    Merged(SubmittedPullRequest),
    Closed(SubmittedPullRequest),
}

impl PullRequest {
    #[must_use]
    pub fn base(&self) -> &PullRequestBase {
        match self {
            Self::Pending(base) => base,
            Self::Open(pr) | Self::Merged(pr) | Self::Closed(pr) => &pr.base,
        }
    }

    #[must_use]
    pub fn repo(&self) -> &str {
        &self.base().repo
    }

    /// Upstream PR number; absent while pending.
    #[must_use]
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Pending(_) => None,
            Self::Open(pr) | Self::Merged(pr) | Self::Closed(pr) => Some(pr.number),
        }
    }

    #[must_use]
    pub fn status_label(&self) -> &'static str {
        match self {
            Self::Pending(_) => "pending",
            Self::Open(_) => "open",
            Self::Merged(_) => "merged",
            Self::Closed(_) => "closed",
        }
    }
}
