//! Duo callback handling: find the suspended state, prove the callback
//! belongs to it, verify the code with Duo and resume.
//!
//! Every check is terminal. Nonces, state ids and Duo error text go to
//! the log; the returned error only carries the generic message.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use duouniversal_core::error::{ConfigIssue, DuoError, DuoResult};
use duouniversal_core::models::correlation::{
    CORRELATION_KIND, CorrelationEntry, Nonce, expires_after,
};
use duouniversal_core::models::state::STATE_STAGE;
use duouniversal_core::repository::{
    KeyValueStore, ProcessingChain, SessionFlagStore, StateRepository, VerificationClient,
};
use tracing::{debug, error};

use crate::config::FilterConfig;
use crate::resolver::{Resolution, resolve};

pub const PARAM_CODE: &str = "duo_code";
pub const PARAM_STATE: &str = "state";
pub const PARAM_ERROR: &str = "error";
pub const PARAM_ERROR_DESCRIPTION: &str = "error_description";

/// A well-formed Duo callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackQuery {
    pub code: String,
    pub nonce: Nonce,
}

impl CallbackQuery {
    pub fn from_params(params: &HashMap<String, String>) -> DuoResult<Self> {
        if let Some(duo_error) = params.get(PARAM_ERROR) {
            let description = params
                .get(PARAM_ERROR_DESCRIPTION)
                .map(String::as_str)
                .unwrap_or_default();
            let reason = format!("{duo_error}:{description}");
            error!(duo_error = %reason, "Error response from Duo in callback");
            return Err(DuoError::BadCallback { reason });
        }

        let code = params.get(PARAM_CODE).filter(|v| !v.is_empty());
        let nonce = params.get(PARAM_STATE).filter(|v| !v.is_empty());
        match (code, nonce) {
            (Some(code), Some(nonce)) => Ok(Self {
                code: code.clone(),
                nonce: Nonce::new(nonce.clone()),
            }),
            _ => {
                error!("Invalid Duo callback, code or state missing");
                Err(DuoError::BadCallback {
                    reason: "code or state missing".into(),
                })
            }
        }
    }
}

/// Validates Duo callbacks and hands verified states back to the SSO
/// engine.
pub struct CallbackValidator<K, S, F, V, P> {
    store: K,
    states: S,
    sessions: F,
    client: V,
    chain: P,
    config: Arc<FilterConfig>,
}

impl<K, S, F, V, P> CallbackValidator<K, S, F, V, P>
where
    K: KeyValueStore,
    S: StateRepository,
    F: SessionFlagStore,
    V: VerificationClient,
    P: ProcessingChain,
{
    /// Fails when `config` carries an unusable lifetime.
    pub fn new(
        store: K,
        states: S,
        sessions: F,
        client: V,
        chain: P,
        config: Arc<FilterConfig>,
    ) -> DuoResult<Self> {
        config.validate()?;
        Ok(Self {
            store,
            states,
            sessions,
            client,
            chain,
            config,
        })
    }

    /// Handle the query parameters of a Duo callback. On success the
    /// suspended state has been passed to the processing chain.
    pub async fn handle_callback(&self, params: &HashMap<String, String>) -> DuoResult<()> {
        debug!("Processing Duo callback");

        // 1-2. Well-formed callback.
        let query = CallbackQuery::from_params(params)?;
        let nonce = query.nonce.as_str();
        debug!("Duo callback appears valid, retrieving associated state");

        // 3. Nonce -> state id. Taken, not read: a replayed or concurrent
        // callback with the same nonce finds nothing.
        let key = CorrelationEntry::key(&self.config.store_prefix, nonce);
        let state_id = match self.store.take(CORRELATION_KIND, &key).await {
            Ok(Some(state_id)) => state_id,
            Ok(None) => {
                error!(nonce = %nonce, "No state with Duo nonce");
                return Err(state_not_found(nonce, None));
            }
            Err(e) => {
                error!(nonce = %nonce, error = ?e, "Failed to load state id with nonce");
                return Err(state_not_found(nonce, None));
            }
        };

        // 4. State id -> state.
        let mut state = match self.states.load_state(&state_id, STATE_STAGE).await {
            Ok(Some(state)) => state,
            Ok(None) => {
                error!(nonce = %nonce, state_id = %state_id, "No state with Duo nonce");
                return Err(state_not_found(nonce, Some(&state_id)));
            }
            Err(e) => {
                error!(nonce = %nonce, state_id = %state_id, error = ?e, "Failed to load state");
                return Err(state_not_found(nonce, Some(&state_id)));
            }
        };

        // 5-6. The state must have been issued for this very nonce.
        let Some(recorded) = state.duo_nonce.as_deref() else {
            error!(nonce = %nonce, state_id = %state_id, "Retrieved state missing Duo nonce");
            return Err(state_not_found(nonce, Some(&state_id)));
        };
        if recorded != nonce {
            error!(
                nonce = %nonce,
                state_id = %state_id,
                "Nonce from retrieved state does not match callback nonce"
            );
            return Err(DuoError::NonceMismatch {
                nonce: nonce.to_string(),
                state_id,
            });
        }

        // 7. Same resolution as at initiation.
        let entity_id = state.relying_party().to_string();
        let app = match resolve(&self.config.resolver, &entity_id)? {
            Resolution::App(app) => app,
            Resolution::Bypass => {
                error!(
                    critical = true,
                    nonce = %nonce,
                    state_id = %state_id,
                    entity_id = %entity_id,
                    "Duo callback retrieved for bypassed entity id"
                );
                return Err(ConfigIssue::BypassedCallback { entity_id }.into());
            }
        };
        debug!(app = %app.name, "Validating Duo response");

        // 8. Exchange the code, bound to the same username as the prompt.
        let Some(username) = state
            .first_attribute(&app.username_attribute)
            .map(str::to_string)
        else {
            error!(
                state_id = %state_id,
                attribute = %app.username_attribute,
                "Username attribute missing from retrieved state"
            );
            return Err(DuoError::VerificationFailed {
                reason: format!("attribute {} missing", app.username_attribute),
            });
        };

        let result = self
            .client
            .exchange_authorization_code(&app, &self.config.callback_url, &query.code, &username)
            .await
            .map_err(|e| {
                error!(app = %app.name, state_id = %state_id, error = %e, "Error decoding Duo result");
                DuoError::VerificationFailed {
                    reason: e.to_string(),
                }
            })?;

        if result.username != username {
            error!(
                app = %app.name,
                state_id = %state_id,
                "Duo result is for a different username"
            );
            return Err(DuoError::VerificationFailed {
                reason: "username mismatch".into(),
            });
        }

        // 9. Remember the pass for this browser session and resume.
        let verified_at = Utc::now();
        state.second_factor_at = Some(verified_at);
        if let Some(session_id) = state.session_id.as_deref() {
            let expires_at = expires_after(verified_at, self.config.session_flag_ttl_secs)
                .ok_or_else(|| ConfigIssue::InvalidSetting {
                    setting: "sessionFlagTtlSecs",
                    reason: format!("{} is not a usable lifetime", self.config.session_flag_ttl_secs),
                })?;
            self.sessions
                .mark_verified(session_id, verified_at, expires_at)
                .await?;
        }

        debug!(state_id = %state_id, "Duo verification successful, continuing authentication");
        self.chain.resume_processing(state).await
    }
}

fn state_not_found(nonce: &str, state_id: Option<&str>) -> DuoError {
    DuoError::StateNotFound {
        nonce: nonce.to_string(),
        state_id: state_id.map(str::to_string),
    }
}
