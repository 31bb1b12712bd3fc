//! Loading configuration from files and the environment.

use std::path::Path;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::schema::GatewayConfig;

/// Overrides `execute_limit.max_requests`.
pub const EXECUTE_MAX_REQUESTS: &str = "TOOLGATE_EXECUTE_MAX_REQUESTS";
/// Overrides `execute_limit.window_ms`.
pub const EXECUTE_WINDOW_MS: &str = "TOOLGATE_EXECUTE_WINDOW_MS";
/// Overrides `confirm_limit.max_requests`.
pub const CONFIRM_MAX_REQUESTS: &str = "TOOLGATE_CONFIRM_MAX_REQUESTS";
/// Overrides `confirm_limit.window_ms`.
pub const CONFIRM_WINDOW_MS: &str = "TOOLGATE_CONFIRM_WINDOW_MS";
/// Overrides `default_timeout_ms`.
pub const DEFAULT_TIMEOUT_MS: &str = "TOOLGATE_DEFAULT_TIMEOUT_MS";
/// Overrides `cache.default_ttl_ms`.
pub const CACHE_TTL_MS: &str = "TOOLGATE_CACHE_TTL_MS";
/// Overrides `audit.journal_path`.
pub const AUDIT_JOURNAL: &str = "TOOLGATE_AUDIT_JOURNAL";

impl GatewayConfig {
    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed documents.
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded gateway config");
        Self::from_json_str(&raw)
    }

    /// Applies `TOOLGATE_*` overrides resolved through `lookup`.
    ///
    /// Pass `|key| std::env::var(key).ok()` to read the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for values that do not parse.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = parse_override(&lookup, EXECUTE_MAX_REQUESTS)? {
            self.execute_limit.max_requests = value;
        }
        if let Some(value) = parse_override(&lookup, EXECUTE_WINDOW_MS)? {
            self.execute_limit.window_ms = value;
        }
        if let Some(value) = parse_override(&lookup, CONFIRM_MAX_REQUESTS)? {
            self.confirm_limit.max_requests = value;
        }
        if let Some(value) = parse_override(&lookup, CONFIRM_WINDOW_MS)? {
            self.confirm_limit.window_ms = value;
        }
        if let Some(value) = parse_override(&lookup, DEFAULT_TIMEOUT_MS)? {
            self.default_timeout_ms = value;
        }
        if let Some(value) = parse_override(&lookup, CACHE_TTL_MS)? {
            self.cache.default_ttl_ms = value;
        }
        if let Some(path) = lookup(AUDIT_JOURNAL).filter(|value| !value.trim().is_empty()) {
            self.audit.journal_path = Some(path.into());
        }
        Ok(())
    }
}

fn parse_override<T, F>(lookup: &F, key: &'static str) -> ConfigResult<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidOverride { key, value: raw })
}
