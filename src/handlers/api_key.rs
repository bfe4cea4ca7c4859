use axum::{extract::State, response::IntoResponse, Json};

use crate::error::AppError;
use crate::middleware::AuthAccount;
use crate::AppState;

/// Generate (or regenerate) the account's API key. Entitlement-gated; a
/// prior key is replaced atomically with no overlap window. The key
/// material is returned in the view for the owner to copy.
pub async fn generate_api_key(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.generate_api_key(account_id).await?;
    super::sync_cache(&state, &registry);
    Ok(Json(registry.methods_view()))
}

/// Delete the API key; idempotent when none exists.
pub async fn revoke_api_key(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.revoke_api_key(account_id).await?;
    super::sync_cache(&state, &registry);
    Ok(Json(registry.methods_view()))
}
