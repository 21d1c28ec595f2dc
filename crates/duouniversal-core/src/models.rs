//! Domain models shared by the filter and its storage back-ends.

pub mod app;
pub mod correlation;
pub mod state;
