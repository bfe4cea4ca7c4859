//! Per-account registry of linked auth methods.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::api_key::ApiKeyCredential;
use super::provider::{ProviderId, LOGIN_PROVIDERS};

/// Linked state of the email provider. Email is the one provider with a
/// two-phase link: the binding sits in `Pending` until the out-of-band
/// verification callback confirms the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "address")]
pub enum EmailBinding {
    Unlinked,
    Pending(String),
    Linked(String),
}

impl EmailBinding {
    pub fn is_linked(&self) -> bool {
        matches!(self, EmailBinding::Linked(_))
    }
}

/// Coarse linked state of a provider, used by the unlink policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedState {
    Unlinked,
    Pending,
    Linked,
}

/// Snapshot of which providers are bound to an account as usable login
/// methods. Created when the account is created (with the signup provider
/// linked), mutated only through the link operations, never deleted while
/// the account exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthMethodRegistry {
    pub account_id: Uuid,
    /// Lightning node pubkey (hex) when linked.
    pub lightning: Option<String>,
    /// Nostr pubkey (hex) when linked.
    pub nostr: Option<String>,
    /// External github account id when linked.
    pub github: Option<String>,
    /// External twitter account id when linked.
    pub twitter: Option<String>,
    pub email: EmailBinding,
    /// Secondary API credential; excluded from the login-method count.
    pub api_key: Option<ApiKeyCredential>,
    /// Admin-owned entitlement allowing API key generation.
    pub api_key_enabled: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthMethodRegistry {
    pub fn new(account_id: Uuid) -> Self {
        Self {
            account_id,
            lightning: None,
            nostr: None,
            github: None,
            twitter: None,
            email: EmailBinding::Unlinked,
            api_key: None,
            api_key_enabled: false,
            created_at: Utc::now(),
        }
    }

    /// Linked state of a single provider.
    pub fn state_of(&self, provider: ProviderId) -> LinkedState {
        let linked = |opt: &Option<String>| {
            if opt.is_some() {
                LinkedState::Linked
            } else {
                LinkedState::Unlinked
            }
        };
        match provider {
            ProviderId::Lightning => linked(&self.lightning),
            ProviderId::Nostr => linked(&self.nostr),
            ProviderId::Github => linked(&self.github),
            ProviderId::Twitter => linked(&self.twitter),
            ProviderId::Email => match self.email {
                EmailBinding::Unlinked => LinkedState::Unlinked,
                EmailBinding::Pending(_) => LinkedState::Pending,
                EmailBinding::Linked(_) => LinkedState::Linked,
            },
            ProviderId::ApiKey => {
                if self.api_key.is_some() {
                    LinkedState::Linked
                } else {
                    LinkedState::Unlinked
                }
            }
        }
    }

    pub fn is_linked(&self, provider: ProviderId) -> bool {
        self.state_of(provider) == LinkedState::Linked
    }

    /// Number of linked login methods. The API key never counts: it is a
    /// secondary credential and cannot keep an account reachable by itself.
    pub fn linked_count(&self) -> usize {
        LOGIN_PROVIDERS
            .iter()
            .filter(|p| self.is_linked(**p))
            .count()
    }

    /// The client-visible shape of the registry, mirroring what the
    /// settings aggregate exposes per provider.
    pub fn methods_view(&self) -> AuthMethodsView {
        AuthMethodsView {
            lightning: self.lightning.is_some(),
            nostr: self.nostr.is_some(),
            github: self.github.is_some(),
            twitter: self.twitter.is_some(),
            email: match &self.email {
                EmailBinding::Linked(address) => Some(address.clone()),
                _ => None,
            },
            api_key: self.api_key.as_ref().map(|k| k.key.clone()),
        }
    }
}

/// The partial registry delta every successful mutation returns: linked
/// flags per OAuth-style/keypair provider, the verified address for email,
/// the key material for the API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethodsView {
    pub lightning: bool,
    pub nostr: bool,
    pub github: bool,
    pub twitter: bool,
    pub email: Option<String>,
    pub api_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linked_count_ignores_api_key_and_pending_email() {
        let mut registry = AuthMethodRegistry::new(Uuid::new_v4());
        assert_eq!(registry.linked_count(), 0);

        registry.lightning = Some("02abc".to_string());
        registry.api_key = Some(ApiKeyCredential::generate());
        registry.email = EmailBinding::Pending("a@b.com".to_string());
        assert_eq!(registry.linked_count(), 1);

        registry.email = EmailBinding::Linked("a@b.com".to_string());
        assert_eq!(registry.linked_count(), 2);
    }

    #[test]
    fn methods_view_carries_email_address_and_key_material() {
        let mut registry = AuthMethodRegistry::new(Uuid::new_v4());
        registry.email = EmailBinding::Linked("a@b.com".to_string());
        let key = ApiKeyCredential::generate();
        let material = key.key.clone();
        registry.api_key = Some(key);

        let view = registry.methods_view();
        assert_eq!(view.email.as_deref(), Some("a@b.com"));
        assert_eq!(view.api_key, Some(material));
        assert!(!view.lightning);
    }
}
