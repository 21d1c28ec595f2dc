//! Start of the second-factor step: redirect the user to Duo.

use std::sync::Arc;

use duouniversal_core::error::{DuoError, DuoResult};
use duouniversal_core::models::correlation::{CORRELATION_KIND, CorrelationEntry, Nonce};
use duouniversal_core::models::state::{EntityRef, STATE_STAGE, SuspendedState};
use duouniversal_core::repository::{
    KeyValueStore, SessionFlagStore, StateRepository, VerificationClient,
};
use tracing::{debug, error, info};

use crate::config::FilterConfig;
use crate::nonce::generate_nonce;
use crate::resolver::{Resolution, resolve};

/// Metadata set an upstream IdP is looked up in when bridging.
const UPSTREAM_IDP_METADATA_SET: &str = "saml20-idp-remote";

/// Where to send the browser next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    /// Duo Universal Prompt URL.
    pub url: String,
    pub nonce: Nonce,
    /// Id the suspended state was saved under.
    pub state_id: String,
}

/// Result of [`RedirectInitiator::initiate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateOutcome {
    /// Send the user to Duo; the state has been saved.
    Redirect(RedirectTarget),
    /// The relying party is configured to skip Duo. Resume immediately.
    Bypass(SuspendedState),
    /// This browser session already passed Duo. Resume immediately.
    AlreadyVerified(SuspendedState),
}

/// Prepares the Duo redirect for a suspended authentication.
///
/// Generic over the collaborator traits so the filter has no dependency
/// on a particular SSO engine or storage back-end.
pub struct RedirectInitiator<K, S, F, V> {
    store: K,
    states: S,
    sessions: F,
    client: V,
    config: Arc<FilterConfig>,
}

impl<K, S, F, V> RedirectInitiator<K, S, F, V>
where
    K: KeyValueStore,
    S: StateRepository,
    F: SessionFlagStore,
    V: VerificationClient,
{
    /// Fails when `config` carries an unusable lifetime.
    pub fn new(
        store: K,
        states: S,
        sessions: F,
        client: V,
        config: Arc<FilterConfig>,
    ) -> DuoResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            states,
            sessions,
            client,
            config,
        })
    }

    /// Run the filter for `state`.
    ///
    /// Nothing is written to the store or the state repository unless the
    /// outcome is [`InitiateOutcome::Redirect`].
    pub async fn initiate(&self, mut state: SuspendedState) -> DuoResult<InitiateOutcome> {
        let entity_id = state.relying_party().to_string();

        // 1. Bridged: the upstream IdP becomes the effective source.
        if let Some(upstream) = state.upstream_idp.clone() {
            debug!(upstream_idp = %upstream, "bridged authentication, using upstream IdP as source");
            state.source = Some(EntityRef {
                entity_id: upstream,
                metadata_set: Some(UPSTREAM_IDP_METADATA_SET.into()),
            });
        }

        // 2. Duo needs the user, so passive requests cannot succeed.
        if state.is_passive {
            error!(entity_id = %entity_id, "Unable to login with passive request");
            return Err(DuoError::PassiveNotSupported);
        }

        // 3. Pick the Duo application.
        let app = match resolve(&self.config.resolver, &entity_id)? {
            Resolution::Bypass => {
                info!(entity_id = %entity_id, "Bypassing Duo prompt");
                return Ok(InitiateOutcome::Bypass(state));
            }
            Resolution::App(app) => app,
        };
        debug!(app = %app.name, "Using Duo config");

        let already_verified = match (state.authn_instant, state.session_id.as_deref()) {
            (Some(_), Some(session_id)) => self.sessions.is_verified(session_id).await?,
            _ => false,
        };
        if already_verified {
            info!(entity_id = %entity_id, "Session already passed Duo, skipping prompt");
            return Ok(InitiateOutcome::AlreadyVerified(state));
        }

        // 4. Username presented to Duo.
        let Some(username) = state
            .first_attribute(&app.username_attribute)
            .map(str::to_string)
        else {
            error!(
                app = %app.name,
                attribute = %app.username_attribute,
                "Username attribute missing from current state"
            );
            return Err(DuoError::MissingAttribute {
                attribute: app.username_attribute.clone(),
            });
        };

        // 5. Do not send the user into a dead end.
        if let Err(e) = self.client.health_check(&app).await {
            error!(app = %app.name, api_host = %app.api_host, error = %e, "Duo health check failed");
            return Err(DuoError::ServiceUnavailable {
                reason: e.to_string(),
            });
        }

        // 6. Fresh nonce, attached to the state and used as Duo's `state`.
        let nonce = generate_nonce();
        let url = self
            .client
            .create_auth_url(&app, &self.config.callback_url, &username, &nonce)
            .map_err(|e| {
                error!(app = %app.name, error = %e, "Unable to build Duo prompt URL");
                DuoError::ServiceUnavailable {
                    reason: e.to_string(),
                }
            })?;
        state.duo_nonce = Some(nonce.as_str().to_string());

        // 7. Save the state and map the nonce to its id.
        let state_id = self.states.save_state(&state, STATE_STAGE).await?;
        let entry = CorrelationEntry::new(
            &self.config.store_prefix,
            &nonce,
            state_id,
            self.config.correlation_ttl_secs,
        )?;
        if let Err(e) = self
            .store
            .set(CORRELATION_KIND, &entry.key, &entry.state_id, entry.expires_at)
            .await
        {
            error!(
                state_id = %entry.state_id,
                error = ?e,
                "Failed to store Duo nonce, saved state is unreachable"
            );
            return Err(e);
        }

        // 8. Off to Duo.
        debug!(nonce = %nonce, state_id = %entry.state_id, "Redirecting to Duo");
        Ok(InitiateOutcome::Redirect(RedirectTarget {
            url,
            nonce,
            state_id: entry.state_id,
        }))
    }
}
