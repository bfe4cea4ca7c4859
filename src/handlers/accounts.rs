use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use validator::ValidateEmail;

use crate::dtos::{CreateAccountRequest, CreateAccountResponse, SignupInput};
use crate::error::AppError;
use crate::services::SignupMethod;
use crate::AppState;

/// Create an account registry with the signup provider already linked, so
/// the at-least-one-login-method invariant holds from the first snapshot.
pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, AppError> {
    let signup = match req.into_signup() {
        SignupInput::Proof { provider, proof } => {
            let identity = state.links.verify_proof(provider, &proof)?;
            SignupMethod::Identity(identity)
        }
        SignupInput::Email(email) => {
            if !email.validate_email() {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Invalid email format"
                )));
            }
            SignupMethod::Email(email)
        }
    };

    let registry = state.links.create_account(signup).await?;
    super::sync_cache(&state, &registry);

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            account_id: registry.account_id,
            auth_methods: registry.methods_view(),
        }),
    ))
}
