use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::dtos::{ChallengeResponse, LinkRequest, UnlinkRequest};
use crate::error::AppError;
use crate::middleware::AuthAccount;
use crate::models::ProviderId;
use crate::AppState;

fn parse_provider(raw: &str) -> Result<ProviderId, AppError> {
    raw.parse::<ProviderId>()
        .map_err(|e| AppError::BadRequest(anyhow::anyhow!(e)))
}

/// Issue a single-use nonce for the external signer to sign (lightning and
/// nostr link flows).
pub async fn issue_challenge(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let challenge = state.links.issue_link_challenge(provider)?;
    Ok(Json(ChallengeResponse { challenge }))
}

pub async fn link_provider(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Path(provider): Path<String>,
    Json(req): Json<LinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let registry = state.links.link(account_id, provider, &req.into()).await?;
    super::sync_cache(&state, &registry);
    Ok(Json(registry.methods_view()))
}

/// Unlink a provider. When the target is the last remaining login method
/// this fails with 428 until the request carries the exact typed warning
/// phrase; the body is optional for the common case.
pub async fn unlink_provider(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Path(provider): Path<String>,
    body: Option<Json<UnlinkRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let confirmation = body.as_ref().and_then(|req| req.0.confirmation.as_deref());

    let registry = state.links.unlink(account_id, provider, confirmation).await?;
    super::sync_cache(&state, &registry);
    Ok(Json(registry.methods_view()))
}

/// The user closed the confirmation dialog without acknowledging.
pub async fn abandon_unlink(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
) -> impl IntoResponse {
    state.links.abandon_confirmation(account_id);
    StatusCode::NO_CONTENT
}
