//! Per-relying-party Duo application resolution.
//!
//! Resolution is a pure function of the configuration and the relying
//! party id. The initiator and the callback validator both call it and
//! must get the same answer. Every ambiguity fails closed: an undefined
//! override never falls back to the default app and never bypasses.

use duouniversal_core::error::{ConfigIssue, DuoResult};
use duouniversal_core::models::app::{
    AppConfig, AppDefinition, AppOverride, DEFAULT_APP_NAME, ResolverConfig,
};
use tracing::error;

/// Outcome of resolving a relying party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Prompt with these credentials.
    App(AppConfig),
    /// Skip the second factor for this relying party.
    Bypass,
}

impl Resolution {
    pub fn is_bypass(&self) -> bool {
        matches!(self, Resolution::Bypass)
    }
}

/// Decide which Duo application serves `entity_id`.
pub fn resolve(config: &ResolverConfig, entity_id: &str) -> DuoResult<Resolution> {
    let Some(default_app) = config.default_app.as_ref() else {
        error!("module configuration missing defaultDuoApp");
        return Err(ConfigIssue::MissingDefaultApp.into());
    };

    let Some(override_entry) = config
        .sp_overrides
        .as_ref()
        .and_then(|overrides| overrides.get(entity_id))
    else {
        return validate_app(default_app, DEFAULT_APP_NAME).map(Resolution::App);
    };

    match override_entry {
        AppOverride::Bypass => Ok(Resolution::Bypass),
        AppOverride::App(name) => match config.alternate_apps.get(name) {
            Some(definition) => validate_app(definition, name).map(Resolution::App),
            None => {
                error!(app = %name, entity_id = %entity_id, "undefined alternateDuoApp");
                Err(ConfigIssue::UndefinedAlternateApp {
                    app: name.clone(),
                    entity_id: entity_id.to_string(),
                }
                .into())
            }
        },
    }
}

/// Check that every credential field is present and non-empty.
pub fn validate_app(definition: &AppDefinition, name: &str) -> DuoResult<AppConfig> {
    fn present(value: Option<&str>) -> Option<String> {
        value.filter(|v| !v.is_empty()).map(str::to_string)
    }

    let client_id = present(definition.client_id.as_deref());
    let client_secret = definition
        .client_secret
        .as_ref()
        .filter(|secret| !secret.is_empty())
        .cloned();
    let api_host = present(definition.api_host.as_deref());
    let username_attribute = present(definition.username_attribute.as_deref());

    match (client_id, client_secret, api_host, username_attribute) {
        (Some(client_id), Some(client_secret), Some(api_host), Some(username_attribute)) => {
            Ok(AppConfig {
                name: name.to_string(),
                client_id,
                client_secret,
                api_host,
                username_attribute,
            })
        }
        (client_id, client_secret, api_host, username_attribute) => {
            let fields: Vec<&'static str> = [
                ("clientID", client_id.is_none()),
                ("clientSecret", client_secret.is_none()),
                ("apiHost", api_host.is_none()),
                ("usernameAttribute", username_attribute.is_none()),
            ]
            .into_iter()
            .filter_map(|(field, missing)| missing.then_some(field))
            .collect();

            error!(app = %name, missing = %fields.join(","), "Duo app config missing attributes");
            Err(ConfigIssue::MissingFields {
                app: name.to_string(),
                fields,
            }
            .into())
        }
    }
}
