//! Duo Universal Core: data model, error taxonomy and the collaborator
//! traits the second-factor filter is driven through.

pub mod error;
pub mod memory;
pub mod models;
pub mod repository;

pub use error::{ConfigIssue, DuoError, DuoResult, ProviderError};
