//! Correlation nonce generation.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use duouniversal_core::models::correlation::Nonce;

/// Random bytes behind each nonce.
const NONCE_BYTES: usize = 32;

/// Generate a fresh nonce from the OS-seeded CSPRNG
/// (32 bytes → base64url-encoded, no padding).
pub fn generate_nonce() -> Nonce {
    let mut rng = rand::rng();
    let bytes: [u8; NONCE_BYTES] = rand::Rng::random(&mut rng);
    Nonce::new(URL_SAFE_NO_PAD.encode(bytes))
}
