//! Client-visible settings cache.
//!
//! The registry is one slice of a larger account-settings aggregate that
//! also carries plain key/value preferences. Every successful mutation
//! produces a delta; the cache applies a field-level merge into the held
//! aggregate (unrelated fields keep their identity, nothing is re-fetched
//! wholesale) and broadcasts the new snapshot to all observers.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use uuid::Uuid;

use crate::models::{AuthMethodRegistry, AuthMethodsView};

/// The full aggregate a settings client observes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    pub account_id: Uuid,
    pub auth_methods: AuthMethodsView,
    pub api_key_enabled: bool,
    /// Preference fields with no safety invariant; opaque to this
    /// subsystem but co-resident in the aggregate, so merges must not
    /// clobber them.
    pub preferences: serde_json::Map<String, Value>,
}

impl AccountSettings {
    fn seeded(registry: &AuthMethodRegistry) -> Self {
        Self {
            account_id: registry.account_id,
            auth_methods: registry.methods_view(),
            api_key_enabled: registry.api_key_enabled,
            preferences: serde_json::Map::new(),
        }
    }
}

/// Partial update produced by one mutation.
#[derive(Debug, Clone)]
pub enum SettingsDelta {
    /// The auth slice of the aggregate changed.
    AuthMethods {
        view: AuthMethodsView,
        api_key_enabled: bool,
    },
    /// One unrelated preference changed.
    Preference { key: String, value: Value },
}

impl SettingsDelta {
    pub fn from_registry(registry: &AuthMethodRegistry) -> Self {
        SettingsDelta::AuthMethods {
            view: registry.methods_view(),
            api_key_enabled: registry.api_key_enabled,
        }
    }
}

/// One watch channel per account; observers subscribe once and receive
/// every merged snapshot thereafter.
#[derive(Default)]
pub struct SettingsCaches {
    entries: DashMap<Uuid, watch::Sender<AccountSettings>>,
}

impl SettingsCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an aggregate exists for the account, seeding the auth slice
    /// from a registry snapshot without touching anything already held.
    pub fn seed(&self, registry: &AuthMethodRegistry) {
        self.entries
            .entry(registry.account_id)
            .or_insert_with(|| watch::channel(AccountSettings::seeded(registry)).0);
    }

    /// Field-level merge of a delta into the held aggregate.
    pub fn apply(&self, account_id: Uuid, delta: SettingsDelta) {
        let Some(sender) = self.entries.get(&account_id) else {
            tracing::warn!(account_id = %account_id, "Delta for unseeded settings cache dropped");
            return;
        };
        sender.send_modify(|settings| match delta {
            SettingsDelta::AuthMethods {
                view,
                api_key_enabled,
            } => {
                settings.auth_methods = view;
                settings.api_key_enabled = api_key_enabled;
            }
            SettingsDelta::Preference { key, value } => {
                settings.preferences.insert(key, value);
            }
        });
    }

    pub fn snapshot(&self, account_id: Uuid) -> Option<AccountSettings> {
        self.entries
            .get(&account_id)
            .map(|sender| sender.borrow().clone())
    }

    pub fn subscribe(&self, account_id: Uuid) -> Option<watch::Receiver<AccountSettings>> {
        self.entries
            .get(&account_id)
            .map(|sender| sender.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailBinding;
    use serde_json::json;

    fn registry() -> AuthMethodRegistry {
        let mut registry = AuthMethodRegistry::new(Uuid::new_v4());
        registry.lightning = Some("02aa".to_string());
        registry
    }

    #[test]
    fn auth_delta_preserves_unrelated_preferences() {
        let caches = SettingsCaches::new();
        let mut registry = registry();
        caches.seed(&registry);

        caches.apply(
            registry.account_id,
            SettingsDelta::Preference {
                key: "fiatCurrency".to_string(),
                value: json!("EUR"),
            },
        );

        // A later auth mutation must merge, not overwrite.
        registry.email = EmailBinding::Linked("a@b.com".to_string());
        caches.apply(registry.account_id, SettingsDelta::from_registry(&registry));

        let settings = caches.snapshot(registry.account_id).unwrap();
        assert_eq!(settings.preferences.get("fiatCurrency"), Some(&json!("EUR")));
        assert_eq!(settings.auth_methods.email.as_deref(), Some("a@b.com"));
        assert!(settings.auth_methods.lightning);
    }

    #[tokio::test]
    async fn observers_see_each_merged_snapshot() {
        let caches = SettingsCaches::new();
        let mut registry = registry();
        caches.seed(&registry);

        let mut observer = caches.subscribe(registry.account_id).unwrap();
        assert!(observer.borrow().auth_methods.lightning);

        registry.nostr = Some("8f3b".to_string());
        caches.apply(registry.account_id, SettingsDelta::from_registry(&registry));

        observer.changed().await.unwrap();
        assert!(observer.borrow().auth_methods.nostr);
    }

    #[test]
    fn reseeding_does_not_reset_held_state() {
        let caches = SettingsCaches::new();
        let registry = registry();
        caches.seed(&registry);
        caches.apply(
            registry.account_id,
            SettingsDelta::Preference {
                key: "tipDefault".to_string(),
                value: json!(21),
            },
        );

        caches.seed(&registry);
        let settings = caches.snapshot(registry.account_id).unwrap();
        assert_eq!(settings.preferences.get("tipDefault"), Some(&json!(21)));
    }
}
