//! Storage contract for auth method registries.
//!
//! The engine behind the contract is a deployment concern; the service and
//! its tests run on [`MemoryStore`]. Whatever the engine, the last-method
//! safety check must be re-derived atomically with the removal itself;
//! the policy answer computed before the call is advisory only.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ApiKeyCredential, AuthMethodRegistry, EmailBinding, ProviderId};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("account not found")]
    NotFound,

    #[error("provider already linked to this account")]
    AlreadyLinked,

    #[error("identity already linked to another account")]
    LinkedElsewhere,

    #[error("account is not entitled to API keys")]
    NotEntitled,

    #[error("unknown or spent verification token")]
    VerificationUnknown,

    #[error("storage failure: {0}")]
    Transient(#[source] anyhow::Error),
}

/// An external identity that can be bound to an account in a single step.
/// Email is excluded: its link is two-phase and goes through
/// [`RegistryStore::begin_email_link`] / [`RegistryStore::confirm_email_link`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExternalIdentity {
    /// Lightning node pubkey that signed the link challenge.
    Lightning(String),
    /// Nostr pubkey that signed the link challenge.
    Nostr(String),
    /// Asserted github account id.
    Github(String),
    /// Asserted twitter account id.
    Twitter(String),
}

impl ExternalIdentity {
    pub fn provider(&self) -> ProviderId {
        match self {
            ExternalIdentity::Lightning(_) => ProviderId::Lightning,
            ExternalIdentity::Nostr(_) => ProviderId::Nostr,
            ExternalIdentity::Github(_) => ProviderId::Github,
            ExternalIdentity::Twitter(_) => ProviderId::Twitter,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            ExternalIdentity::Lightning(id)
            | ExternalIdentity::Nostr(id)
            | ExternalIdentity::Github(id)
            | ExternalIdentity::Twitter(id) => id,
        }
    }
}

/// The provider an account signs up with; the registry is created with it
/// already linked so the at-least-one-method invariant holds from birth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupMethod {
    Identity(ExternalIdentity),
    /// Email verified during the external signup flow.
    Email(String),
}

/// Result of a conditional unlink write.
#[derive(Debug)]
pub enum UnlinkOutcome {
    /// Provider removed; updated registry returned.
    Removed(AuthMethodRegistry),
    /// Provider was already unlinked; success with no state change, so a
    /// double-submitted request never surfaces a spurious failure.
    NoChange(AuthMethodRegistry),
    /// Removal refused: it would have left zero login methods and the
    /// request carried no confirmation. Re-derived inside the write.
    LastMethod,
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn create_account(&self, signup: SignupMethod) -> Result<AuthMethodRegistry, StoreError>;

    async fn registry(&self, account_id: Uuid) -> Result<AuthMethodRegistry, StoreError>;

    /// Bind a verified external identity. Fails with `AlreadyLinked` when
    /// the account already has the provider, `LinkedElsewhere` when the
    /// identity belongs to a different account.
    async fn link_identity(
        &self,
        account_id: Uuid,
        identity: ExternalIdentity,
    ) -> Result<AuthMethodRegistry, StoreError>;

    /// Store a pending, unverified email binding keyed by the digest of the
    /// verification token that was sent out of band.
    async fn begin_email_link(
        &self,
        account_id: Uuid,
        address: String,
        token_digest: String,
    ) -> Result<AuthMethodRegistry, StoreError>;

    /// React to the external verification callback: promote the pending
    /// binding to linked. The token digest is single-use.
    async fn confirm_email_link(&self, token_digest: &str)
        -> Result<AuthMethodRegistry, StoreError>;

    /// Conditionally remove a provider. `confirmed` carries the fact that a
    /// valid typed confirmation accompanied the request; without it the
    /// write refuses to orphan the account.
    async fn unlink(
        &self,
        account_id: Uuid,
        provider: ProviderId,
        confirmed: bool,
    ) -> Result<UnlinkOutcome, StoreError>;

    /// Install a freshly generated API key, atomically replacing any prior
    /// one. Fails with `NotEntitled` unless the admin flag is set.
    async fn install_api_key(
        &self,
        account_id: Uuid,
        credential: ApiKeyCredential,
    ) -> Result<AuthMethodRegistry, StoreError>;

    /// Remove the API key; idempotent when none exists.
    async fn revoke_api_key(&self, account_id: Uuid) -> Result<AuthMethodRegistry, StoreError>;

    /// Admin-owned entitlement toggle.
    async fn set_api_key_enabled(
        &self,
        account_id: Uuid,
        enabled: bool,
    ) -> Result<AuthMethodRegistry, StoreError>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Sharded in-memory store. Accounts are independent; mutations of one
/// account serialize on its dashmap entry guard, which is what makes the
/// unlink a single conditional write rather than a check-then-act race.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, AuthMethodRegistry>,
    /// Reverse index enforcing that an external identity binds to at most
    /// one account.
    identities: DashMap<(ProviderId, String), Uuid>,
    /// Outstanding email verification token digests.
    pending_email: DashMap<String, Uuid>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim_identity(
        &self,
        provider: ProviderId,
        id: &str,
        account_id: Uuid,
    ) -> Result<(), StoreError> {
        match self.identities.entry((provider, id.to_string())) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if *entry.get() == account_id {
                    Err(StoreError::AlreadyLinked)
                } else {
                    Err(StoreError::LinkedElsewhere)
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(account_id);
                Ok(())
            }
        }
    }

    fn release_identity(&self, provider: ProviderId, id: &str) {
        self.identities.remove(&(provider, id.to_string()));
    }
}

#[async_trait]
impl RegistryStore for MemoryStore {
    async fn create_account(&self, signup: SignupMethod) -> Result<AuthMethodRegistry, StoreError> {
        let account_id = Uuid::new_v4();
        let mut registry = AuthMethodRegistry::new(account_id);

        match &signup {
            SignupMethod::Identity(identity) => {
                self.claim_identity(identity.provider(), identity.id(), account_id)?;
                match identity {
                    ExternalIdentity::Lightning(id) => registry.lightning = Some(id.clone()),
                    ExternalIdentity::Nostr(id) => registry.nostr = Some(id.clone()),
                    ExternalIdentity::Github(id) => registry.github = Some(id.clone()),
                    ExternalIdentity::Twitter(id) => registry.twitter = Some(id.clone()),
                }
            }
            SignupMethod::Email(address) => {
                self.claim_identity(ProviderId::Email, address, account_id)?;
                registry.email = EmailBinding::Linked(address.clone());
            }
        }

        self.accounts.insert(account_id, registry.clone());
        tracing::info!(account_id = %account_id, "Account registry created");
        Ok(registry)
    }

    async fn registry(&self, account_id: Uuid) -> Result<AuthMethodRegistry, StoreError> {
        self.accounts
            .get(&account_id)
            .map(|r| r.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn link_identity(
        &self,
        account_id: Uuid,
        identity: ExternalIdentity,
    ) -> Result<AuthMethodRegistry, StoreError> {
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        if entry.is_linked(identity.provider()) {
            return Err(StoreError::AlreadyLinked);
        }
        self.claim_identity(identity.provider(), identity.id(), account_id)?;
        match &identity {
            ExternalIdentity::Lightning(id) => entry.lightning = Some(id.clone()),
            ExternalIdentity::Nostr(id) => entry.nostr = Some(id.clone()),
            ExternalIdentity::Github(id) => entry.github = Some(id.clone()),
            ExternalIdentity::Twitter(id) => entry.twitter = Some(id.clone()),
        }
        Ok(entry.clone())
    }

    async fn begin_email_link(
        &self,
        account_id: Uuid,
        address: String,
        token_digest: String,
    ) -> Result<AuthMethodRegistry, StoreError> {
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        if entry.email.is_linked() {
            return Err(StoreError::AlreadyLinked);
        }
        if let Some(owner) = self.identities.get(&(ProviderId::Email, address.clone())) {
            if *owner != account_id {
                return Err(StoreError::LinkedElsewhere);
            }
        }
        entry.email = EmailBinding::Pending(address);
        // Re-requesting invalidates any earlier outstanding token.
        self.pending_email.retain(|_, owner| *owner != account_id);
        self.pending_email.insert(token_digest, account_id);
        Ok(entry.clone())
    }

    async fn confirm_email_link(
        &self,
        token_digest: &str,
    ) -> Result<AuthMethodRegistry, StoreError> {
        let (_, account_id) = self
            .pending_email
            .remove(token_digest)
            .ok_or(StoreError::VerificationUnknown)?;

        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        let address = match &entry.email {
            EmailBinding::Pending(address) => address.clone(),
            // Token outlived the pending binding (unlinked or re-requested).
            _ => return Err(StoreError::VerificationUnknown),
        };

        self.claim_identity(ProviderId::Email, &address, account_id)?;
        entry.email = EmailBinding::Linked(address);
        tracing::info!(account_id = %account_id, "Email link verified");
        Ok(entry.clone())
    }

    async fn unlink(
        &self,
        account_id: Uuid,
        provider: ProviderId,
        confirmed: bool,
    ) -> Result<UnlinkOutcome, StoreError> {
        // The entry guard holds the shard lock for the whole read-check-write,
        // so concurrent unlinks of the same account serialize here.
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;

        if provider == ProviderId::ApiKey {
            entry.api_key = None;
            return Ok(UnlinkOutcome::Removed(entry.clone()));
        }

        if !entry.is_linked(provider) {
            // Pending email bindings are discarded without ceremony; they
            // were never a usable login method.
            if provider == ProviderId::Email {
                entry.email = EmailBinding::Unlinked;
            }
            return Ok(UnlinkOutcome::NoChange(entry.clone()));
        }

        if entry.linked_count() == 1 && !confirmed {
            return Ok(UnlinkOutcome::LastMethod);
        }

        let released = match provider {
            ProviderId::Lightning => entry.lightning.take(),
            ProviderId::Nostr => entry.nostr.take(),
            ProviderId::Github => entry.github.take(),
            ProviderId::Twitter => entry.twitter.take(),
            ProviderId::Email => match std::mem::replace(&mut entry.email, EmailBinding::Unlinked)
            {
                EmailBinding::Linked(address) => Some(address),
                _ => None,
            },
            ProviderId::ApiKey => unreachable!("handled above"),
        };
        if let Some(id) = released {
            self.release_identity(provider, &id);
        }
        tracing::info!(account_id = %account_id, provider = %provider, "Auth method unlinked");
        Ok(UnlinkOutcome::Removed(entry.clone()))
    }

    async fn install_api_key(
        &self,
        account_id: Uuid,
        credential: ApiKeyCredential,
    ) -> Result<AuthMethodRegistry, StoreError> {
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        if !entry.api_key_enabled {
            return Err(StoreError::NotEntitled);
        }
        // Single write: the old key stops authenticating the instant the
        // new one lands. No overlap window.
        entry.api_key = Some(credential);
        Ok(entry.clone())
    }

    async fn revoke_api_key(&self, account_id: Uuid) -> Result<AuthMethodRegistry, StoreError> {
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        entry.api_key = None;
        Ok(entry.clone())
    }

    async fn set_api_key_enabled(
        &self,
        account_id: Uuid,
        enabled: bool,
    ) -> Result<AuthMethodRegistry, StoreError> {
        let mut entry = self.accounts.get_mut(&account_id).ok_or(StoreError::NotFound)?;
        entry.api_key_enabled = enabled;
        Ok(entry.clone())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
