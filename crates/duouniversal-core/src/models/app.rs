//! Duo application credentials and the per-relying-party routing table.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Override value that disables the second factor for a relying party.
pub const BYPASS_MARKER: &str = "bypass";

/// Name reported for the default application.
pub const DEFAULT_APP_NAME: &str = "default";

/// Duo client secret. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientSecret(String);

impl ClientSecret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ClientSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked: String = std::iter::repeat_n('X', self.0.len()).collect();
        f.debug_tuple("ClientSecret").field(&masked).finish()
    }
}

impl From<&str> for ClientSecret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An application definition as written in the module configuration.
///
/// Every field may be absent so that validation can report exactly what
/// is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppDefinition {
    #[serde(rename = "clientID", default)]
    pub client_id: Option<String>,
    #[serde(rename = "clientSecret", default)]
    pub client_secret: Option<ClientSecret>,
    #[serde(rename = "apiHost", default)]
    pub api_host: Option<String>,
    #[serde(rename = "usernameAttribute", default)]
    pub username_attribute: Option<String>,
}

/// A validated application credential set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `"default"` or the alternate application's name.
    pub name: String,
    pub client_id: String,
    pub client_secret: ClientSecret,
    pub api_host: String,
    /// Attribute holding the username presented to Duo.
    pub username_attribute: String,
}

/// Per-relying-party override entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppOverride {
    Bypass,
    App(String),
}

impl From<String> for AppOverride {
    fn from(value: String) -> Self {
        if value == BYPASS_MARKER {
            AppOverride::Bypass
        } else {
            AppOverride::App(value)
        }
    }
}

impl From<&str> for AppOverride {
    fn from(value: &str) -> Self {
        AppOverride::from(value.to_string())
    }
}

impl From<AppOverride> for String {
    fn from(value: AppOverride) -> Self {
        match value {
            AppOverride::Bypass => BYPASS_MARKER.to_string(),
            AppOverride::App(name) => name,
        }
    }
}

/// Application routing table, loaded once and never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolverConfig {
    #[serde(alias = "defaultDuoApp", default)]
    pub default_app: Option<AppDefinition>,
    #[serde(alias = "alternateDuoApps", default)]
    pub alternate_apps: HashMap<String, AppDefinition>,
    #[serde(alias = "spDuoOverrides", default)]
    pub sp_overrides: Option<HashMap<String, AppOverride>>,
}
