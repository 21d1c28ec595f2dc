//! Filter configuration.

use std::path::Path;

use duouniversal_core::error::{ConfigIssue, DuoError, DuoResult};
use duouniversal_core::models::app::ResolverConfig;
use duouniversal_core::models::correlation::{
    CORRELATION_TTL_SECS, DEFAULT_STORE_PREFIX, MAX_CORRELATION_TTL_SECS,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Session flag lifetime when not configured (8 hours).
pub const DEFAULT_SESSION_FLAG_TTL_SECS: i64 = 8 * 60 * 60;

/// Longest accepted session flag lifetime (7 days).
pub const MAX_SESSION_FLAG_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Module configuration, loaded once and shared read-only by the
/// initiator and the callback validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    /// Default app, alternate apps and per-SP overrides.
    #[serde(flatten)]
    pub resolver: ResolverConfig,
    /// Prefix for correlation keys in the external store.
    #[serde(default = "default_store_prefix")]
    pub store_prefix: String,
    /// Pre-registered URL Duo redirects back to.
    #[serde(default)]
    pub callback_url: String,
    /// Lifetime of a correlation entry (default: 300 = 5 minutes).
    #[serde(default = "default_correlation_ttl")]
    pub correlation_ttl_secs: i64,
    /// How long a passed second factor covers the browser session.
    #[serde(default = "default_session_flag_ttl")]
    pub session_flag_ttl_secs: i64,
}

fn default_store_prefix() -> String {
    DEFAULT_STORE_PREFIX.into()
}

fn default_correlation_ttl() -> i64 {
    CORRELATION_TTL_SECS
}

fn default_session_flag_ttl() -> i64 {
    DEFAULT_SESSION_FLAG_TTL_SECS
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            store_prefix: default_store_prefix(),
            callback_url: String::new(),
            correlation_ttl_secs: CORRELATION_TTL_SECS,
            session_flag_ttl_secs: DEFAULT_SESSION_FLAG_TTL_SECS,
        }
    }
}

impl FilterConfig {
    pub fn from_json_str(raw: &str) -> DuoResult<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| DuoError::from(ConfigIssue::Unreadable(format!("invalid JSON: {e}"))))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject lifetimes outside `1..=max`.
    pub fn validate(&self) -> DuoResult<()> {
        check_lifetime(
            "correlationTtlSecs",
            self.correlation_ttl_secs,
            MAX_CORRELATION_TTL_SECS,
        )?;
        check_lifetime(
            "sessionFlagTtlSecs",
            self.session_flag_ttl_secs,
            MAX_SESSION_FLAG_TTL_SECS,
        )
    }

    pub fn from_path(path: impl AsRef<Path>) -> DuoResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DuoError::from(ConfigIssue::Unreadable(format!("{}: {e}", path.display())))
        })?;
        Self::from_json_str(&raw)
    }
}

fn check_lifetime(setting: &'static str, secs: i64, max: i64) -> DuoResult<()> {
    if (1..=max).contains(&secs) {
        return Ok(());
    }
    error!(setting, value = secs, max, "lifetime out of range");
    Err(ConfigIssue::InvalidSetting {
        setting,
        reason: format!("{secs} is outside 1..={max} seconds"),
    }
    .into())
}
