//! Suspended authentication state owned by the SSO engine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Purpose tag under which the filter saves and loads states.
pub const STATE_STAGE: &str = "duouniversal:duoRedirect";

/// A SAML/OIDC entity taking part in the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_id: String,
    /// Metadata set the entity was found in (e.g. `saml20-idp-remote`).
    #[serde(default)]
    pub metadata_set: Option<String>,
}

impl EntityRef {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            metadata_set: None,
        }
    }
}

/// The parent authentication transaction, paused while the user is away
/// at Duo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspendedState {
    /// Relying party the user is authenticating to.
    pub destination: EntityRef,
    #[serde(default)]
    pub source: Option<EntityRef>,
    /// Upstream IdP when running as a bridge (`saml:sp:IdP`).
    #[serde(default)]
    pub upstream_idp: Option<String>,
    /// The request forbids user interaction.
    #[serde(default)]
    pub is_passive: bool,
    /// When the first-factor authentication happened.
    #[serde(default)]
    pub authn_instant: Option<DateTime<Utc>>,
    /// Browser session the transaction belongs to.
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
    /// Correlation nonce attached before the redirect to Duo.
    #[serde(default)]
    pub duo_nonce: Option<String>,
    /// Set once Duo has confirmed the second factor.
    #[serde(default)]
    pub second_factor_at: Option<DateTime<Utc>>,
}

impl SuspendedState {
    pub fn new(destination_entity_id: impl Into<String>) -> Self {
        Self {
            destination: EntityRef::new(destination_entity_id),
            source: None,
            upstream_idp: None,
            is_passive: false,
            authn_instant: None,
            session_id: None,
            attributes: BTreeMap::new(),
            duo_nonce: None,
            second_factor_at: None,
        }
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.attributes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Identifier of the relying party that drives app resolution.
    pub fn relying_party(&self) -> &str {
        &self.destination.entity_id
    }

    /// First value of an attribute, if present and non-empty.
    pub fn first_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}
