//! Link/unlink orchestration.
//!
//! Request flow for an unlink: early policy evaluation for fast rejection
//! and confirmation prompting, then the store's atomic conditional write as
//! the authoritative check. Confirmation challenges live here, one open
//! challenge per account, each bound to a single unlink intent.

use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{
    ApiKeyCredential, AuthMethodRegistry, ChallengeError, ConfirmationChallenge, ProviderId,
    UnlinkIntent,
};
use crate::services::mailer::VerificationMailer;
use crate::services::policy::{UnlinkDecision, UnlinkPolicy};
use crate::services::proof::{generate_link_token, token_digest, LinkProof, ProofVerifier};
use crate::services::store::{RegistryStore, SignupMethod, StoreError, UnlinkOutcome};

#[derive(Clone)]
pub struct LinkService {
    store: Arc<dyn RegistryStore>,
    mailer: Arc<dyn VerificationMailer>,
    verifier: Arc<ProofVerifier>,
    base_url: String,
    challenges: Arc<DashMap<Uuid, ConfirmationChallenge>>,
}

impl LinkService {
    pub fn new(
        store: Arc<dyn RegistryStore>,
        mailer: Arc<dyn VerificationMailer>,
        verifier: Arc<ProofVerifier>,
        base_url: String,
    ) -> Self {
        Self {
            store,
            mailer,
            verifier,
            base_url,
            challenges: Arc::new(DashMap::new()),
        }
    }

    pub async fn create_account(
        &self,
        signup: SignupMethod,
    ) -> Result<AuthMethodRegistry, AppError> {
        self.store.create_account(signup).await.map_err(store_err)
    }

    pub async fn current_methods(&self, account_id: Uuid) -> Result<AuthMethodRegistry, AppError> {
        self.store.registry(account_id).await.map_err(store_err)
    }

    pub fn issue_link_challenge(&self, provider: ProviderId) -> Result<String, AppError> {
        self.verifier.issue_challenge(provider)
    }

    /// Verify a proof without binding it; signup uses this before the
    /// registry exists.
    pub fn verify_proof(
        &self,
        provider: ProviderId,
        proof: &LinkProof,
    ) -> Result<crate::services::store::ExternalIdentity, AppError> {
        self.verifier.verify(provider, proof)
    }

    /// Link a provider after verifying its proof. Email goes through the
    /// two-phase flow and the API key through `generate_api_key`.
    pub async fn link(
        &self,
        account_id: Uuid,
        provider: ProviderId,
        proof: &LinkProof,
    ) -> Result<AuthMethodRegistry, AppError> {
        let identity = self.verifier.verify(provider, proof)?;
        let registry = self
            .store
            .link_identity(account_id, identity)
            .await
            .map_err(store_err)?;
        tracing::info!(account_id = %account_id, provider = %provider, "Auth method linked");
        Ok(registry)
    }

    /// First phase of the email link: store a pending binding and hand a
    /// verification token to the mail collaborator.
    pub async fn request_email_link(
        &self,
        account_id: Uuid,
        address: String,
    ) -> Result<AuthMethodRegistry, AppError> {
        let token = generate_link_token();
        let registry = self
            .store
            .begin_email_link(account_id, address.clone(), token_digest(&token))
            .await
            .map_err(store_err)?;

        self.mailer
            .send_link_verification(&address, &token, &self.base_url)
            .await?;

        tracing::info!(account_id = %account_id, "Email link requested, verification pending");
        Ok(registry)
    }

    /// Second phase: react to the external verification callback.
    pub async fn confirm_email_link(&self, token: &str) -> Result<AuthMethodRegistry, AppError> {
        self.store
            .confirm_email_link(&token_digest(token))
            .await
            .map_err(store_err)
    }

    /// Unlink a provider. Without a valid confirmation this fails with
    /// `ConfirmationRequired` whenever the target is the last login method;
    /// it never silently blocks and never performs the mutation first.
    pub async fn unlink(
        &self,
        account_id: Uuid,
        provider: ProviderId,
        confirmation: Option<&str>,
    ) -> Result<AuthMethodRegistry, AppError> {
        let registry = self.store.registry(account_id).await.map_err(store_err)?;

        let confirmed = match UnlinkPolicy::evaluate(&registry, provider) {
            UnlinkDecision::Proceed => false,
            UnlinkDecision::RequireConfirmation => {
                self.redeem_confirmation(account_id, provider, confirmation)?
            }
        };

        let outcome = self.store.unlink(account_id, provider, confirmed).await;

        if confirmed {
            // Single-use per intent, spent whether or not the write
            // succeeded; a retry starts over with a fresh challenge.
            if let Some((_, mut challenge)) = self.challenges.remove(&account_id) {
                challenge.consume();
            }
        }

        match outcome.map_err(store_err)? {
            UnlinkOutcome::Removed(registry) | UnlinkOutcome::NoChange(registry) => Ok(registry),
            UnlinkOutcome::LastMethod => {
                // The store's atomic re-check fired: the registry changed
                // between our early policy answer and the write.
                self.offer_challenge(account_id, provider);
                Err(AppError::ConfirmationRequired)
            }
        }
    }

    /// The user closed the dialog: terminal `Abandoned`, nothing executes.
    pub fn abandon_confirmation(&self, account_id: Uuid) {
        if let Some((_, mut challenge)) = self.challenges.remove(&account_id) {
            challenge.abandon();
            tracing::info!(account_id = %account_id, "Unlink confirmation abandoned");
        }
    }

    pub async fn generate_api_key(
        &self,
        account_id: Uuid,
    ) -> Result<AuthMethodRegistry, AppError> {
        let registry = self
            .store
            .install_api_key(account_id, ApiKeyCredential::generate())
            .await
            .map_err(store_err)?;
        tracing::info!(account_id = %account_id, "API key generated");
        Ok(registry)
    }

    pub async fn revoke_api_key(&self, account_id: Uuid) -> Result<AuthMethodRegistry, AppError> {
        let registry = self
            .store
            .revoke_api_key(account_id)
            .await
            .map_err(store_err)?;
        tracing::info!(account_id = %account_id, "API key revoked");
        Ok(registry)
    }

    pub async fn set_api_key_entitlement(
        &self,
        account_id: Uuid,
        enabled: bool,
    ) -> Result<AuthMethodRegistry, AppError> {
        let registry = self
            .store
            .set_api_key_enabled(account_id, enabled)
            .await
            .map_err(store_err)?;
        tracing::info!(account_id = %account_id, enabled, "API key entitlement updated");
        Ok(registry)
    }

    fn offer_challenge(&self, account_id: Uuid, provider: ProviderId) {
        self.challenges.insert(
            account_id,
            ConfirmationChallenge::offer(UnlinkIntent::new(provider)),
        );
    }

    /// Resolve the confirmation argument against the account's open
    /// challenge. `Ok(true)` means a token was redeemed for exactly this
    /// provider's intent; every other path re-offers and errors.
    fn redeem_confirmation(
        &self,
        account_id: Uuid,
        provider: ProviderId,
        confirmation: Option<&str>,
    ) -> Result<bool, AppError> {
        let phrase = match confirmation {
            Some(phrase) => phrase,
            None => {
                self.offer_challenge(account_id, provider);
                return Err(AppError::ConfirmationRequired);
            }
        };

        let mut entry = match self.challenges.get_mut(&account_id) {
            Some(entry) => entry,
            None => {
                // Phrase supplied with no open challenge; the token it
                // would redeem was never offered for this intent.
                self.offer_challenge(account_id, provider);
                return Err(AppError::ConfirmationRequired);
            }
        };

        if entry.intent().provider != provider {
            // A challenge offered for one provider never authorizes
            // another; re-offer for the provider actually requested.
            *entry = ConfirmationChallenge::offer(UnlinkIntent::new(provider));
            return Err(AppError::ConfirmationRequired);
        }

        let token = match entry.acknowledge(phrase) {
            Ok(token) => token,
            Err(ChallengeError::PhraseMismatch) => {
                // Challenge stays offered; the user can retype.
                return Err(AppError::ConfirmationRequired);
            }
            Err(_) => {
                *entry = ConfirmationChallenge::offer(UnlinkIntent::new(provider));
                return Err(AppError::ConfirmationRequired);
            }
        };

        entry
            .authorizes(&token, provider)
            .map_err(|_| AppError::ConfirmationRequired)?;
        Ok(true)
    }
}

fn store_err(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound => AppError::NotFound,
        StoreError::AlreadyLinked => AppError::AlreadyLinked,
        StoreError::LinkedElsewhere => AppError::LinkedElsewhere,
        StoreError::NotEntitled => AppError::NotEntitled,
        StoreError::VerificationUnknown => {
            AppError::ProofInvalid("unknown or spent verification token".to_string())
        }
        StoreError::Transient(e) => AppError::TransientStorage(e),
    }
}
