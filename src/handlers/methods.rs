use axum::{extract::State, response::IntoResponse, Json};

use crate::dtos::PreferenceUpdate;
use crate::error::AppError;
use crate::middleware::AuthAccount;
use crate::services::SettingsDelta;
use crate::AppState;

/// Full settings aggregate: auth methods plus unrelated preferences.
pub async fn get_settings(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.current_methods(account_id).await?;
    state.caches.seed(&registry);
    let settings = state
        .caches
        .snapshot(account_id)
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("settings cache missing")))?;
    Ok(Json(settings))
}

/// The auth slice only, in the client-visible shape.
pub async fn get_auth_methods(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.current_methods(account_id).await?;
    Ok(Json(registry.methods_view()))
}

/// Key/value preference write. Deliberately oblivious to what the key
/// means; exists so unrelated edits share the aggregate with auth state.
pub async fn update_preference(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(req): Json<PreferenceUpdate>,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.current_methods(account_id).await?;
    state.caches.seed(&registry);
    state.caches.apply(
        account_id,
        SettingsDelta::Preference {
            key: req.key,
            value: req.value,
        },
    );
    let settings = state
        .caches
        .snapshot(account_id)
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("settings cache missing")))?;
    Ok(Json(settings))
}
