//! Collaborator traits.
//!
//! The filter never reaches for global singletons; every external system
//! it talks to is one of these traits, handed over at construction.

use chrono::{DateTime, Utc};

use crate::error::{DuoResult, ProviderError};
use crate::models::app::AppConfig;
use crate::models::correlation::Nonce;
use crate::models::state::SuspendedState;

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Flat key-value store with native expiry.
pub trait KeyValueStore: Send + Sync {
    /// Store `value` under `(kind, key)` until `expires_at`, replacing any
    /// previous value.
    fn set(
        &self,
        kind: &str,
        key: &str,
        value: &str,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = DuoResult<()>> + Send;
    /// `None` when absent or expired.
    fn get(&self, kind: &str, key: &str) -> impl Future<Output = DuoResult<Option<String>>> + Send;
    fn delete(&self, kind: &str, key: &str) -> impl Future<Output = DuoResult<()>> + Send;
    /// Read and remove in one step. Of several concurrent callers at most
    /// one gets the value. `None` when absent or expired.
    fn take(&self, kind: &str, key: &str)
    -> impl Future<Output = DuoResult<Option<String>>> + Send;
}

/// Persistence of suspended states, provided by the SSO engine.
pub trait StateRepository: Send + Sync {
    /// Durably save `state` under the purpose tag and return its id.
    fn save_state(
        &self,
        state: &SuspendedState,
        stage: &str,
    ) -> impl Future<Output = DuoResult<String>> + Send;
    /// `None` when no state with that id was saved under `stage`.
    fn load_state(
        &self,
        state_id: &str,
        stage: &str,
    ) -> impl Future<Output = DuoResult<Option<SuspendedState>>> + Send;
}

/// Per-browser-session "second factor already passed" flag.
pub trait SessionFlagStore: Send + Sync {
    /// `false` once the flag has expired or been cleared.
    fn is_verified(&self, session_id: &str) -> impl Future<Output = DuoResult<bool>> + Send;
    /// Set the flag until `expires_at`, the end of the browser session.
    fn mark_verified(
        &self,
        session_id: &str,
        verified_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> impl Future<Output = DuoResult<()>> + Send;
    /// Drop the flag when the session ends early (logout).
    fn clear(&self, session_id: &str) -> impl Future<Output = DuoResult<()>> + Send;
}

// ---------------------------------------------------------------------------
// SSO engine & vendor
// ---------------------------------------------------------------------------

/// Hands a state back to the SSO engine once the filter is done with it.
pub trait ProcessingChain: Send + Sync {
    fn resume_processing(&self, state: SuspendedState) -> impl Future<Output = DuoResult<()>> + Send;
}

/// Outcome of a successful code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Username Duo authenticated.
    pub username: String,
    pub auth_time: Option<DateTime<Utc>>,
}

/// The Duo Universal Prompt capability: health probe, prompt URL and code
/// exchange. Token signing and validation live behind this trait.
pub trait VerificationClient: Send + Sync {
    fn health_check(&self, app: &AppConfig)
    -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Build the Duo prompt URL for `username`, carrying `nonce` as the
    /// opaque state.
    fn create_auth_url(
        &self,
        app: &AppConfig,
        redirect_uri: &str,
        username: &str,
        nonce: &Nonce,
    ) -> Result<String, ProviderError>;

    /// Exchange `code` for a 2FA result bound to `username`.
    fn exchange_authorization_code(
        &self,
        app: &AppConfig,
        redirect_uri: &str,
        code: &str,
        username: &str,
    ) -> impl Future<Output = Result<VerificationResult, ProviderError>> + Send;
}
