//! Duo Universal filter: sends users through the Duo Universal Prompt
//! after first-factor authentication and resumes the suspended SSO
//! transaction once Duo confirms the second factor.

pub mod callback;
pub mod config;
pub mod initiator;
pub mod nonce;
pub mod resolver;

pub use callback::{CallbackQuery, CallbackValidator};
pub use config::FilterConfig;
pub use initiator::{InitiateOutcome, RedirectInitiator, RedirectTarget};
pub use resolver::{Resolution, resolve};
