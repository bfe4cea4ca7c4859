//! Typed-acknowledgment gate for destructive unlinks.
//!
//! Removing the last remaining login method is guarded by an exact-text
//! confirmation, not a yes/no prompt, so a habitual button-mash cannot lock
//! someone out of their account.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::provider::ProviderId;

/// The exact phrase the user must type to acknowledge a last-method unlink.
/// Case-sensitive, no normalization.
pub const LAST_METHOD_WARNING: &str =
    "If I logout, even accidentally, I will never be able to access my account again";

/// A user's request to unlink a provider. Ephemeral; consumed by the policy
/// check and, when confirmation is needed, bound to one challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlinkIntent {
    pub provider: ProviderId,
    pub requested_at: DateTime<Utc>,
}

impl UnlinkIntent {
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    Offered,
    Acknowledged,
    /// Terminal: the underlying unlink was attempted, successfully or not.
    Consumed,
    /// Terminal: the user walked away without acknowledging.
    Abandoned,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChallengeError {
    #[error("confirmation phrase does not match")]
    PhraseMismatch,
    #[error("challenge is not open for acknowledgment")]
    NotOffered,
    #[error("confirmation token was issued for a different unlink intent")]
    WrongIntent,
}

/// Single-use proof that a specific challenge was acknowledged. Valid only
/// for the one intent the challenge was offered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationToken {
    provider: ProviderId,
    requested_at: DateTime<Utc>,
}

impl ConfirmationToken {
    pub fn provider(&self) -> ProviderId {
        self.provider
    }
}

/// Explicit state value for the confirmation flow:
/// `Offered -> Acknowledged -> Consumed`, or `Offered -> Abandoned`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationChallenge {
    intent: UnlinkIntent,
    state: ChallengeState,
}

impl ConfirmationChallenge {
    pub fn offer(intent: UnlinkIntent) -> Self {
        Self {
            intent,
            state: ChallengeState::Offered,
        }
    }

    pub fn intent(&self) -> &UnlinkIntent {
        &self.intent
    }

    pub fn state(&self) -> ChallengeState {
        self.state
    }

    /// Acknowledge with the typed phrase. Requires an exact match against
    /// [`LAST_METHOD_WARNING`]; anything else leaves the challenge open.
    pub fn acknowledge(&mut self, phrase: &str) -> Result<ConfirmationToken, ChallengeError> {
        if self.state != ChallengeState::Offered {
            return Err(ChallengeError::NotOffered);
        }
        if phrase != LAST_METHOD_WARNING {
            return Err(ChallengeError::PhraseMismatch);
        }
        self.state = ChallengeState::Acknowledged;
        Ok(ConfirmationToken {
            provider: self.intent.provider,
            requested_at: self.intent.requested_at,
        })
    }

    /// Validate that a token authorizes unlinking `provider` through this
    /// challenge. A token minted for one intent never transfers to another.
    pub fn authorizes(
        &self,
        token: &ConfirmationToken,
        provider: ProviderId,
    ) -> Result<(), ChallengeError> {
        if self.state != ChallengeState::Acknowledged {
            return Err(ChallengeError::NotOffered);
        }
        if token.provider != provider
            || token.provider != self.intent.provider
            || token.requested_at != self.intent.requested_at
        {
            return Err(ChallengeError::WrongIntent);
        }
        Ok(())
    }

    /// Mark the challenge spent. Called after the unlink attempt regardless
    /// of its outcome; a retried unlink must start a fresh challenge.
    pub fn consume(&mut self) {
        self.state = ChallengeState::Consumed;
    }

    pub fn abandon(&mut self) {
        if self.state == ChallengeState::Offered {
            self.state = ChallengeState::Abandoned;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acknowledge_requires_exact_phrase() {
        let mut challenge = ConfirmationChallenge::offer(UnlinkIntent::new(ProviderId::Lightning));

        assert_eq!(
            challenge.acknowledge("yes I am sure"),
            Err(ChallengeError::PhraseMismatch)
        );
        // Case matters.
        assert_eq!(
            challenge.acknowledge(&LAST_METHOD_WARNING.to_lowercase()),
            Err(ChallengeError::PhraseMismatch)
        );
        assert_eq!(challenge.state(), ChallengeState::Offered);

        assert!(challenge.acknowledge(LAST_METHOD_WARNING).is_ok());
        assert_eq!(challenge.state(), ChallengeState::Acknowledged);
    }

    #[test]
    fn challenge_is_single_use() {
        let mut challenge = ConfirmationChallenge::offer(UnlinkIntent::new(ProviderId::Email));
        challenge.acknowledge(LAST_METHOD_WARNING).unwrap();
        challenge.consume();

        assert_eq!(challenge.state(), ChallengeState::Consumed);
        assert_eq!(
            challenge.acknowledge(LAST_METHOD_WARNING),
            Err(ChallengeError::NotOffered)
        );
    }

    #[test]
    fn token_does_not_transfer_between_intents() {
        let mut lightning = ConfirmationChallenge::offer(UnlinkIntent::new(ProviderId::Lightning));
        let token = lightning.acknowledge(LAST_METHOD_WARNING).unwrap();

        assert_eq!(
            lightning.authorizes(&token, ProviderId::Nostr),
            Err(ChallengeError::WrongIntent)
        );
        assert!(lightning.authorizes(&token, ProviderId::Lightning).is_ok());
    }

    #[test]
    fn abandoned_challenge_cannot_be_acknowledged() {
        let mut challenge = ConfirmationChallenge::offer(UnlinkIntent::new(ProviderId::Nostr));
        challenge.abandon();
        assert_eq!(challenge.state(), ChallengeState::Abandoned);
        assert_eq!(
            challenge.acknowledge(LAST_METHOD_WARNING),
            Err(ChallengeError::NotOffered)
        );
    }
}
