//! Error types for the second-factor filter.
//!
//! `Display` output of [`DuoError`] is what may reach the browser, so it
//! never carries configuration names, nonces or state identifiers. The
//! variant fields hold that detail for operator-facing logs.

use thiserror::Error;

/// Why a configuration was rejected. Operator-facing only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigIssue {
    #[error("module configuration is missing the default Duo application")]
    MissingDefaultApp,

    #[error("Duo app config {app} missing attributes: {}", .fields.join(","))]
    MissingFields {
        app: String,
        fields: Vec<&'static str>,
    },

    #[error("undefined alternate Duo application {app} for entity id {entity_id}")]
    UndefinedAlternateApp { app: String, entity_id: String },

    #[error("Duo callback retrieved for bypassed entity id {entity_id}")]
    BypassedCallback { entity_id: String },

    #[error("unable to load module configuration: {0}")]
    Unreadable(String),

    #[error("invalid {setting}: {reason}")]
    InvalidSetting {
        setting: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DuoError {
    #[error("Server configuration invalid.")]
    Configuration(ConfigIssue),

    #[error("Invalid Duo callback.")]
    BadCallback { reason: String },

    #[error("No authentication state found for this Duo response.")]
    StateNotFound {
        nonce: String,
        state_id: Option<String>,
    },

    #[error("Duo response does not belong to this authentication.")]
    NonceMismatch { nonce: String, state_id: String },

    #[error("Unable to login with passive request.")]
    PassiveNotSupported,

    #[error("Username attribute missing from current state.")]
    MissingAttribute { attribute: String },

    #[error("Duo is currently unavailable.")]
    ServiceUnavailable { reason: String },

    #[error("Error decoding Duo result.")]
    VerificationFailed { reason: String },

    #[error("Storage error.")]
    Store(String),
}

impl DuoError {
    /// `true` when the failure stems from the request itself rather than
    /// from this server or its dependencies.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DuoError::BadCallback { .. }
                | DuoError::MissingAttribute { .. }
                | DuoError::VerificationFailed { .. }
        )
    }
}

impl From<ConfigIssue> for DuoError {
    fn from(issue: ConfigIssue) -> Self {
        DuoError::Configuration(issue)
    }
}

/// Failure reported by the vendor verification capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The service could not be reached or answered with a server error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered and refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

pub type DuoResult<T> = Result<T, DuoError>;
