pub mod accounts;
pub mod admin;
pub mod api_key;
pub mod email;
pub mod link;
pub mod methods;

use crate::models::AuthMethodRegistry;
use crate::services::SettingsDelta;
use crate::AppState;

/// Reconcile the settings cache after a successful mutation: seed if this
/// is the first sighting of the account, then merge the registry delta.
pub(crate) fn sync_cache(state: &AppState, registry: &AuthMethodRegistry) {
    state.caches.seed(registry);
    state
        .caches
        .apply(registry.account_id, SettingsDelta::from_registry(registry));
}
