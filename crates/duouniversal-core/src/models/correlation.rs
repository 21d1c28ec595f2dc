//! Correlation between a Duo redirect and its callback.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigIssue, DuoResult};

pub const DEFAULT_STORE_PREFIX: &str = "duouniversal";

/// Lifetime of a correlation entry in the external store.
pub const CORRELATION_TTL_SECS: i64 = 300;

/// Longest accepted correlation lifetime.
pub const MAX_CORRELATION_TTL_SECS: i64 = 3600;

/// Value type the correlation entries are stored under.
pub const CORRELATION_KIND: &str = "string";

/// Single-use correlation token sent to Duo as the `state` parameter.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Nonce").field(&self.0).finish()
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Store record mapping a nonce to the saved state id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrelationEntry {
    pub key: String,
    pub state_id: String,
    pub expires_at: DateTime<Utc>,
}

impl CorrelationEntry {
    pub fn new(
        prefix: &str,
        nonce: &Nonce,
        state_id: impl Into<String>,
        ttl_secs: i64,
    ) -> DuoResult<Self> {
        let expires_at = expires_after(Utc::now(), ttl_secs).ok_or_else(|| {
            ConfigIssue::InvalidSetting {
                setting: "correlationTtlSecs",
                reason: format!("{ttl_secs} is not a usable lifetime"),
            }
        })?;
        Ok(Self {
            key: Self::key(prefix, nonce.as_str()),
            state_id: state_id.into(),
            expires_at,
        })
    }

    /// `{prefix}:{nonce}`
    pub fn key(prefix: &str, nonce: &str) -> String {
        format!("{prefix}:{nonce}")
    }
}

/// `from + ttl_secs`, or `None` when the lifetime is not positive or the
/// result is out of range.
pub fn expires_after(from: DateTime<Utc>, ttl_secs: i64) -> Option<DateTime<Utc>> {
    if ttl_secs <= 0 {
        return None;
    }
    TimeDelta::try_seconds(ttl_secs).and_then(|ttl| from.checked_add_signed(ttl))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn key_joins_prefix_and_nonce() {
        assert_eq!(CorrelationEntry::key("duouniversal", "abc"), "duouniversal:abc");
    }

    #[test]
    fn entry_expires_after_ttl() {
        let before = Utc::now();
        let entry =
            CorrelationEntry::new("p", &Nonce::new("n"), "state-1", CORRELATION_TTL_SECS).unwrap();
        assert_eq!(entry.key, "p:n");
        assert!(entry.expires_at >= before + Duration::seconds(CORRELATION_TTL_SECS));
        assert!(entry.expires_at <= Utc::now() + Duration::seconds(CORRELATION_TTL_SECS));
    }

    #[test]
    fn unusable_lifetimes_are_rejected() {
        for ttl in [0, -5, i64::MAX, i64::MIN] {
            let err = CorrelationEntry::new("p", &Nonce::new("n"), "state-1", ttl).unwrap_err();
            assert!(matches!(
                err,
                crate::error::DuoError::Configuration(ConfigIssue::InvalidSetting {
                    setting: "correlationTtlSecs",
                    ..
                })
            ));
        }
    }

    #[test]
    fn expiry_is_checked() {
        let now = Utc::now();
        assert_eq!(expires_after(now, 1), Some(now + Duration::seconds(1)));
        assert_eq!(expires_after(now, 0), None);
        assert_eq!(expires_after(DateTime::<Utc>::MAX_UTC, 1), None);
    }
}
