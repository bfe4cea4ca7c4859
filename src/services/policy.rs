//! Unlink decision policy.
//!
//! This is the fast, client-facing half of the last-method safety check:
//! pure, no side effects, evaluated identically for interactive and
//! programmatic callers. The storage layer re-derives the same check
//! atomically with the removal, so a stale answer here can delay an unlink
//! but never orphan an account.

use crate::models::{AuthMethodRegistry, ProviderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlinkDecision {
    /// Safe to execute immediately.
    Proceed,
    /// The target is the sole remaining login method; an explicit typed
    /// confirmation must accompany the unlink.
    RequireConfirmation,
}

pub struct UnlinkPolicy;

impl UnlinkPolicy {
    /// `RequireConfirmation` iff the target is a login provider, currently
    /// linked, and the only linked login provider. The API key never
    /// endangers login capability, so unlinking it always proceeds.
    pub fn evaluate(registry: &AuthMethodRegistry, provider: ProviderId) -> UnlinkDecision {
        if !provider.is_login_method() {
            return UnlinkDecision::Proceed;
        }
        if registry.is_linked(provider) && registry.linked_count() == 1 {
            UnlinkDecision::RequireConfirmation
        } else {
            UnlinkDecision::Proceed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiKeyCredential, EmailBinding, LOGIN_PROVIDERS};
    use uuid::Uuid;

    fn registry_with(providers: &[ProviderId]) -> AuthMethodRegistry {
        let mut registry = AuthMethodRegistry::new(Uuid::new_v4());
        for provider in providers {
            match provider {
                ProviderId::Lightning => registry.lightning = Some("02aa".to_string()),
                ProviderId::Nostr => registry.nostr = Some("8f3b".to_string()),
                ProviderId::Github => registry.github = Some("1234".to_string()),
                ProviderId::Twitter => registry.twitter = Some("5678".to_string()),
                ProviderId::Email => {
                    registry.email = EmailBinding::Linked("a@b.com".to_string())
                }
                ProviderId::ApiKey => registry.api_key = Some(ApiKeyCredential::generate()),
            }
        }
        registry
    }

    #[test]
    fn sole_linked_login_method_requires_confirmation() {
        for provider in LOGIN_PROVIDERS {
            let registry = registry_with(&[provider]);
            assert_eq!(
                UnlinkPolicy::evaluate(&registry, provider),
                UnlinkDecision::RequireConfirmation,
                "sole {} should require confirmation",
                provider
            );
        }
    }

    #[test]
    fn proceeds_when_another_method_remains() {
        let registry = registry_with(&[ProviderId::Lightning, ProviderId::Nostr]);
        assert_eq!(
            UnlinkPolicy::evaluate(&registry, ProviderId::Lightning),
            UnlinkDecision::Proceed
        );
    }

    #[test]
    fn proceeds_for_unlinked_provider_even_when_last() {
        // Unlinking something that is not linked cannot remove anything.
        let registry = registry_with(&[ProviderId::Lightning]);
        assert_eq!(
            UnlinkPolicy::evaluate(&registry, ProviderId::Nostr),
            UnlinkDecision::Proceed
        );
    }

    #[test]
    fn api_key_never_requires_confirmation() {
        // Even when the API key is the only credential of any kind.
        let registry = registry_with(&[ProviderId::ApiKey]);
        assert_eq!(
            UnlinkPolicy::evaluate(&registry, ProviderId::ApiKey),
            UnlinkDecision::Proceed
        );

        let registry = registry_with(&[ProviderId::Lightning, ProviderId::ApiKey]);
        assert_eq!(
            UnlinkPolicy::evaluate(&registry, ProviderId::ApiKey),
            UnlinkDecision::Proceed
        );
    }

    #[test]
    fn pending_email_does_not_count_as_linked() {
        let mut registry = registry_with(&[ProviderId::Lightning]);
        registry.email = EmailBinding::Pending("a@b.com".to_string());
        assert_eq!(
            UnlinkPolicy::evaluate(&registry, ProviderId::Lightning),
            UnlinkDecision::RequireConfirmation
        );
    }
}
