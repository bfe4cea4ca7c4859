//! Request/response contracts for the HTTP surface.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::AuthMethodsView;
use crate::services::LinkProof;

/// Provider used to sign up, with its proof. Account creation links the
/// signup method so the registry is never born empty.
#[derive(Debug, Deserialize)]
#[serde(tag = "provider", rename_all = "camelCase")]
pub enum CreateAccountRequest {
    Lightning {
        pubkey: String,
        challenge: String,
        signature: String,
    },
    Nostr {
        pubkey: String,
        challenge: String,
        signature: String,
    },
    #[serde(rename_all = "camelCase")]
    Github {
        external_id: String,
        assertion: String,
    },
    #[serde(rename_all = "camelCase")]
    Twitter {
        external_id: String,
        assertion: String,
    },
    /// Address already verified by the external signup flow.
    Email { email: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAccountResponse {
    pub account_id: Uuid,
    pub auth_methods: AuthMethodsView,
}

/// Proof body accompanying a link request; shape depends on the provider
/// family.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LinkRequest {
    SignedChallenge {
        pubkey: String,
        challenge: String,
        signature: String,
    },
    #[serde(rename_all = "camelCase")]
    ExternalAssertion {
        external_id: String,
        assertion: String,
    },
}

impl From<LinkRequest> for LinkProof {
    fn from(req: LinkRequest) -> Self {
        match req {
            LinkRequest::SignedChallenge {
                pubkey,
                challenge,
                signature,
            } => LinkProof::SignedChallenge {
                pubkey,
                challenge,
                signature,
            },
            LinkRequest::ExternalAssertion {
                external_id,
                assertion,
            } => LinkProof::ExternalAssertion {
                external_id,
                assertion,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UnlinkRequest {
    /// The typed acknowledgment phrase, required only when removing the
    /// last remaining login method.
    pub confirmation: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailLinkRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailParams {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ChallengeResponse {
    pub challenge: String,
}

#[derive(Debug, Deserialize)]
pub struct EntitlementRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreferenceUpdate {
    pub key: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Normalized signup input: either a proof that must verify before the
/// account is created, or an email the external signup flow has already
/// verified.
#[derive(Debug)]
pub enum SignupInput {
    Proof {
        provider: crate::models::ProviderId,
        proof: LinkProof,
    },
    Email(String),
}

impl CreateAccountRequest {
    pub fn into_signup(self) -> SignupInput {
        use crate::models::ProviderId;
        match self {
            CreateAccountRequest::Lightning {
                pubkey,
                challenge,
                signature,
            } => SignupInput::Proof {
                provider: ProviderId::Lightning,
                proof: LinkProof::SignedChallenge {
                    pubkey,
                    challenge,
                    signature,
                },
            },
            CreateAccountRequest::Nostr {
                pubkey,
                challenge,
                signature,
            } => SignupInput::Proof {
                provider: ProviderId::Nostr,
                proof: LinkProof::SignedChallenge {
                    pubkey,
                    challenge,
                    signature,
                },
            },
            CreateAccountRequest::Github {
                external_id,
                assertion,
            } => SignupInput::Proof {
                provider: ProviderId::Github,
                proof: LinkProof::ExternalAssertion {
                    external_id,
                    assertion,
                },
            },
            CreateAccountRequest::Twitter {
                external_id,
                assertion,
            } => SignupInput::Proof {
                provider: ProviderId::Twitter,
                proof: LinkProof::ExternalAssertion {
                    external_id,
                    assertion,
                },
            },
            CreateAccountRequest::Email { email } => SignupInput::Email(email),
        }
    }
}
