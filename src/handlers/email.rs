use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use validator::Validate;

use crate::dtos::{EmailLinkRequest, MessageResponse, VerifyEmailParams};
use crate::error::AppError;
use crate::middleware::AuthAccount;
use crate::AppState;

/// First phase of the email link: store the pending binding and trigger
/// the out-of-band verification send.
pub async fn request_email_link(
    State(state): State<AppState>,
    AuthAccount(account_id): AuthAccount,
    Json(req): Json<EmailLinkRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let registry = state.links.request_email_link(account_id, req.email).await?;
    super::sync_cache(&state, &registry);

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Verification email sent. The address links once it is confirmed."
                .to_string(),
        }),
    ))
}

/// External verification callback: the mail recipient followed the link.
pub async fn verify_email_link(
    State(state): State<AppState>,
    Query(params): Query<VerifyEmailParams>,
) -> Result<impl IntoResponse, AppError> {
    let registry = state.links.confirm_email_link(&params.token).await?;
    super::sync_cache(&state, &registry);
    Ok(Json(registry.methods_view()))
}
