//! Host configuration: how to launch and talk to the extension host.

use serde::Deserialize;
use std::time::Duration;

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Environment variable patterns never passed to a spawned extension host.
/// `*` matches any prefix/suffix; comparison is case-insensitive.
pub const ENV_SECRET_DENYLIST: &[&str] = &[
    "*_API_KEY",
    "*_TOKEN",
    "*_SECRET*",
    "*_CREDENTIAL*",
    "*_PASSWORD",
    "AWS_*",
    "GITHUB_TOKEN",
    "SSH_AUTH_SOCK",
];

/// Minimal glob matcher for the denylist patterns. Handles `*_SUFFIX`,
/// `PREFIX_*`, `*_INFIX*`, and exact match; both sides compared uppercase.
#[must_use]
pub fn env_denylist_matches(pattern: &str, key_upper: &str) -> bool {
    let pat = pattern.to_uppercase();
    match (pat.starts_with('*'), pat.ends_with('*')) {
        (true, true) => key_upper.contains(&pat[1..pat.len() - 1]),
        (true, false) => key_upper.ends_with(&pat[1..]),
        (false, true) => key_upper.starts_with(&pat[..pat.len() - 1]),
        (false, false) => key_upper == pat,
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HostConfigError {
    #[error("host command must not be empty")]
    EmptyCommand,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
}

#[derive(Deserialize)]
struct RawHostConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    shutdown_grace_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

/// Validated extension-host launch configuration.
///
/// Invariant: `command` is non-empty and the request timeout is positive
/// (enforced via `#[serde(try_from)]` at the deserialization boundary).
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawHostConfig")]
pub struct HostConfig {
    command: String,
    args: Vec<String>,
    request_timeout: Duration,
    shutdown_grace: Duration,
}

impl TryFrom<RawHostConfig> for HostConfig {
    type Error = HostConfigError;

    fn try_from(raw: RawHostConfig) -> Result<Self, Self::Error> {
        if raw.command.trim().is_empty() {
            return Err(HostConfigError::EmptyCommand);
        }
        if raw.request_timeout_ms == 0 {
            return Err(HostConfigError::ZeroTimeout);
        }
        Ok(Self {
            command: raw.command,
            args: raw.args,
            request_timeout: Duration::from_millis(raw.request_timeout_ms),
            shutdown_grace: Duration::from_millis(raw.shutdown_grace_ms),
        })
    }
}

impl HostConfig {
    pub fn new(command: impl Into<String>) -> Result<Self, HostConfigError> {
        let command = command.into();
        if command.trim().is_empty() {
            return Err(HostConfigError::EmptyCommand);
        }
        Ok(Self {
            command,
            args: Vec::new(),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            shutdown_grace: Duration::from_millis(DEFAULT_SHUTDOWN_GRACE_MS),
        })
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_with_defaults() {
        let config: HostConfig =
            serde_json::from_value(json!({ "command": "quarry-ext-host" })).unwrap();
        assert_eq!(config.command(), "quarry-ext-host");
        assert!(config.args().is_empty());
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn rejects_empty_command() {
        let result: Result<HostConfig, _> = serde_json::from_value(json!({ "command": "  " }));
        assert!(result.is_err());
    }

    #[test]
    fn rejects_zero_timeout() {
        let result: Result<HostConfig, _> =
            serde_json::from_value(json!({ "command": "host", "request_timeout_ms": 0 }));
        assert!(result.is_err());
    }

    #[test]
    fn denylist_matches_prefix_suffix_infix_and_exact() {
        assert!(env_denylist_matches("*_API_KEY", "OPENAI_API_KEY"));
        assert!(env_denylist_matches("AWS_*", "AWS_SECRET_ACCESS_KEY"));
        assert!(env_denylist_matches("*_SECRET*", "MY_SECRET_VALUE"));
        assert!(env_denylist_matches("GITHUB_TOKEN", "github_token".to_uppercase().as_str()));
        assert!(!env_denylist_matches("AWS_*", "MY_AWS"));
        assert!(!env_denylist_matches("*_TOKEN", "TOKENIZER"));
    }
}
