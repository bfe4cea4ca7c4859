use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::dtos::{EntitlementRequest, MessageResponse};
use crate::error::AppError;
use crate::AppState;

/// Flip the API key entitlement for an account. Administrative action; the
/// flag is never user-settable.
pub async fn set_api_key_entitlement(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<EntitlementRequest>,
) -> Result<impl IntoResponse, AppError> {
    let registry = state
        .links
        .set_api_key_entitlement(account_id, req.enabled)
        .await?;
    super::sync_cache(&state, &registry);

    Ok(Json(MessageResponse {
        message: format!("API key entitlement set to {}", req.enabled),
    }))
}
