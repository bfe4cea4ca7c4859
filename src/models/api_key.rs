//! Opaque API key credential, bound 1:1 to an account.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// A generated bearer credential intended for the `x-api-key` request
/// header. The key is an opaque hex string with no internal structure;
/// regeneration replaces it atomically, so the old value stops
/// authenticating the instant a new one is issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyCredential {
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl ApiKeyCredential {
    /// Generate a fresh credential with 32 bytes of entropy.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let key_bytes: [u8; 32] = rng.gen();
        Self {
            key: hex::encode(key_bytes),
            created_at: Utc::now(),
        }
    }

    /// Constant-time comparison against a presented bearer value.
    pub fn authenticates(&self, presented: &str) -> bool {
        self.key.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique_and_opaque() {
        let a = ApiKeyCredential::generate();
        let b = ApiKeyCredential::generate();
        assert_ne!(a.key, b.key);
        assert_eq!(a.key.len(), 64);
    }

    #[test]
    fn authenticates_only_the_exact_key() {
        let credential = ApiKeyCredential::generate();
        assert!(credential.authenticates(&credential.key));
        assert!(!credential.authenticates("deadbeef"));
    }
}
