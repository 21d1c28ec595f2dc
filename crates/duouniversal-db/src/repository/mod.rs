//! SurrealDB implementations of the core storage traits.

mod kv_store;
mod session_flag;
mod state;

pub use kv_store::SurrealKeyValueStore;
pub use session_flag::SurrealSessionFlagStore;
pub use state::SurrealStateRepository;

use sha2::{Digest, Sha256};

/// Hex SHA-256 over the parts, NUL-separated. Used as record id so that
/// arbitrary keys never end up in a record identifier.
fn digest_id(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
