//! Provider proof verification.
//!
//! Lightning and nostr linking is a challenge-response: the service issues
//! a random nonce, the external signer signs it, and the link request
//! presents pubkey + signature. OAuth-style providers (github, twitter)
//! arrive as an external-identity assertion minted by the identity gateway
//! and authenticated with a shared HMAC secret.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::models::ProviderId;
use crate::services::store::ExternalIdentity;

type HmacSha256 = Hmac<Sha256>;

/// Provider-specific evidence accompanying a link request.
#[derive(Debug, Clone)]
pub enum LinkProof {
    /// Signature over a previously issued challenge nonce (lightning, nostr).
    SignedChallenge {
        /// Signer pubkey, 32 bytes hex.
        pubkey: String,
        challenge: String,
        /// Ed25519 signature, 64 bytes hex.
        signature: String,
    },
    /// Gateway-signed identity assertion (github, twitter).
    ExternalAssertion {
        external_id: String,
        /// Hex HMAC-SHA256 of `{provider}:{external_id}` under the shared
        /// gateway secret.
        assertion: String,
    },
}

struct IssuedChallenge {
    provider: ProviderId,
    issued_at: DateTime<Utc>,
}

pub struct ProofVerifier {
    assertion_secret: Vec<u8>,
    challenge_ttl: Duration,
    challenges: DashMap<String, IssuedChallenge>,
}

impl ProofVerifier {
    pub fn new(assertion_secret: &str, challenge_ttl_seconds: i64) -> Self {
        Self {
            assertion_secret: assertion_secret.as_bytes().to_vec(),
            challenge_ttl: Duration::seconds(challenge_ttl_seconds),
            challenges: DashMap::new(),
        }
    }

    /// Issue a single-use challenge nonce for a signed-challenge provider.
    pub fn issue_challenge(&self, provider: ProviderId) -> Result<String, AppError> {
        if !provider.uses_signed_challenge() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "{} does not use signed challenges",
                provider
            )));
        }
        // Opportunistic cleanup of expired nonces.
        let cutoff = Utc::now() - self.challenge_ttl;
        self.challenges.retain(|_, c| c.issued_at > cutoff);

        let mut rng = rand::thread_rng();
        let nonce_bytes: [u8; 32] = rng.gen();
        let nonce = hex::encode(nonce_bytes);
        self.challenges.insert(
            nonce.clone(),
            IssuedChallenge {
                provider,
                issued_at: Utc::now(),
            },
        );
        Ok(nonce)
    }

    /// Verify a proof and return the external identity it establishes.
    pub fn verify(
        &self,
        provider: ProviderId,
        proof: &LinkProof,
    ) -> Result<ExternalIdentity, AppError> {
        match (provider, proof) {
            (
                ProviderId::Lightning | ProviderId::Nostr,
                LinkProof::SignedChallenge {
                    pubkey,
                    challenge,
                    signature,
                },
            ) => {
                let (_, issued) = self
                    .challenges
                    .remove(challenge)
                    .ok_or_else(|| AppError::ProofInvalid("unknown challenge".to_string()))?;
                if issued.provider != provider {
                    return Err(AppError::ProofInvalid(
                        "challenge was issued for a different provider".to_string(),
                    ));
                }
                if Utc::now() - issued.issued_at > self.challenge_ttl {
                    return Err(AppError::ProofInvalid("challenge expired".to_string()));
                }
                verify_ed25519(pubkey, challenge, signature)?;
                Ok(match provider {
                    ProviderId::Lightning => ExternalIdentity::Lightning(pubkey.clone()),
                    _ => ExternalIdentity::Nostr(pubkey.clone()),
                })
            }
            (
                ProviderId::Github | ProviderId::Twitter,
                LinkProof::ExternalAssertion {
                    external_id,
                    assertion,
                },
            ) => {
                let mut mac = HmacSha256::new_from_slice(&self.assertion_secret)
                    .map_err(|e| AppError::InternalError(anyhow::anyhow!(e)))?;
                mac.update(format!("{}:{}", provider, external_id).as_bytes());
                let presented = hex::decode(assertion)
                    .map_err(|_| AppError::ProofInvalid("assertion is not hex".to_string()))?;
                mac.verify_slice(&presented).map_err(|_| {
                    AppError::ProofInvalid("assertion does not verify".to_string())
                })?;
                Ok(match provider {
                    ProviderId::Github => ExternalIdentity::Github(external_id.clone()),
                    _ => ExternalIdentity::Twitter(external_id.clone()),
                })
            }
            _ => Err(AppError::ProofInvalid(format!(
                "proof kind does not match provider {}",
                provider
            ))),
        }
    }

    /// Mint an assertion the way the identity gateway does. Counterpart of
    /// the `ExternalAssertion` verification, shared with gateway tooling
    /// and the integration tests.
    pub fn mint_assertion(&self, provider: ProviderId, external_id: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.assertion_secret)
            .expect("HMAC accepts keys of any length");
        mac.update(format!("{}:{}", provider, external_id).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

fn verify_ed25519(pubkey: &str, message: &str, signature: &str) -> Result<(), AppError> {
    let key_bytes: [u8; 32] = hex::decode(pubkey)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AppError::ProofInvalid("pubkey must be 32 bytes hex".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| AppError::ProofInvalid("pubkey is not a valid curve point".to_string()))?;

    let sig_bytes: [u8; 64] = hex::decode(signature)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| AppError::ProofInvalid("signature must be 64 bytes hex".to_string()))?;
    let sig = Signature::from_bytes(&sig_bytes);

    key.verify(message.as_bytes(), &sig)
        .map_err(|_| AppError::ProofInvalid("signature does not verify".to_string()))
}

/// Opaque random token for email verification links.
pub fn generate_link_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

/// Tokens are stored by digest, never in the clear.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn verifier() -> ProofVerifier {
        ProofVerifier::new("gateway-secret", 300)
    }

    fn signed_proof(verifier: &ProofVerifier, provider: ProviderId) -> (LinkProof, String) {
        let signing_key = SigningKey::from_bytes(&[7u8; 32]);
        let pubkey = hex::encode(signing_key.verifying_key().to_bytes());
        let challenge = verifier.issue_challenge(provider).unwrap();
        let signature = hex::encode(signing_key.sign(challenge.as_bytes()).to_bytes());
        (
            LinkProof::SignedChallenge {
                pubkey: pubkey.clone(),
                challenge,
                signature,
            },
            pubkey,
        )
    }

    #[test]
    fn signed_challenge_verifies_and_is_single_use() {
        let verifier = verifier();
        let (proof, pubkey) = signed_proof(&verifier, ProviderId::Nostr);

        let identity = verifier.verify(ProviderId::Nostr, &proof).unwrap();
        assert_eq!(identity, ExternalIdentity::Nostr(pubkey));

        // Replaying the same challenge fails.
        let err = verifier.verify(ProviderId::Nostr, &proof).unwrap_err();
        assert!(matches!(err, AppError::ProofInvalid(_)));
    }

    #[test]
    fn challenge_is_bound_to_its_provider() {
        let verifier = verifier();
        let (proof, _) = signed_proof(&verifier, ProviderId::Lightning);
        let err = verifier.verify(ProviderId::Nostr, &proof).unwrap_err();
        assert!(matches!(err, AppError::ProofInvalid(_)));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let verifier = verifier();
        let (proof, _) = signed_proof(&verifier, ProviderId::Lightning);
        let tampered = match proof {
            LinkProof::SignedChallenge {
                pubkey, challenge, ..
            } => LinkProof::SignedChallenge {
                pubkey,
                challenge,
                signature: hex::encode([0u8; 64]),
            },
            _ => unreachable!(),
        };
        let err = verifier.verify(ProviderId::Lightning, &tampered).unwrap_err();
        assert!(matches!(err, AppError::ProofInvalid(_)));
    }

    #[test]
    fn assertion_verifies_only_under_shared_secret() {
        let verifier = verifier();
        let good = LinkProof::ExternalAssertion {
            external_id: "42".to_string(),
            assertion: verifier.mint_assertion(ProviderId::Github, "42"),
        };
        assert!(verifier.verify(ProviderId::Github, &good).is_ok());

        let other = ProofVerifier::new("different-secret", 300);
        let forged = LinkProof::ExternalAssertion {
            external_id: "42".to_string(),
            assertion: other.mint_assertion(ProviderId::Github, "42"),
        };
        let err = verifier.verify(ProviderId::Github, &forged).unwrap_err();
        assert!(matches!(err, AppError::ProofInvalid(_)));

        // An assertion for one provider cannot vouch for another.
        let crossed = LinkProof::ExternalAssertion {
            external_id: "42".to_string(),
            assertion: verifier.mint_assertion(ProviderId::Github, "42"),
        };
        let err = verifier.verify(ProviderId::Twitter, &crossed).unwrap_err();
        assert!(matches!(err, AppError::ProofInvalid(_)));
    }

    #[test]
    fn token_digest_is_stable_and_hex() {
        let token = generate_link_token();
        assert_eq!(token.len(), 64);
        assert_eq!(token_digest(&token), token_digest(&token));
        assert_ne!(token_digest(&token), token);
    }
}
