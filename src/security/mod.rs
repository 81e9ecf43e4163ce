//! Security primitives for the auth core
//!
//! - `password`: Argon2id password hashing and verification
//! - `tokens`: signed credential issuance and verification (three scopes:
//!   access, refresh, password-reset)
//! - `hash_token`: one-way digest used before any raw token touches storage
pub mod password;
pub mod tokens;

pub use password::{hash_password, verify_password};
pub use tokens::{AccessClaims, RefreshClaims, ResetClaims, TokenPair, TokenSigner};

use sha2::{Digest, Sha256};

/// Hash a raw token with SHA-256 for storage. The ledger never sees the raw
/// token value.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_hash_is_stable_and_hex() {
        let h1 = hash_token("some-raw-token");
        let h2 = hash_token("some-raw-token");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
        assert_ne!(h1, hash_token("other-token"));
    }
}
