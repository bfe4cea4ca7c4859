use axum::{
    async_trait,
    extract::{Request, State},
    http::{request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use axum::extract::FromRequestParts;
use serde_json::json;
use uuid::Uuid;

use crate::AppState;

/// The already-authenticated account identity. Authentication itself is an
/// external collaborator: the gateway validates the session and forwards
/// the account id in `x-account-id`.
#[derive(Debug, Clone, Copy)]
pub struct AuthAccount(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthAccount
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let account_id = parts
            .headers
            .get("x-account-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<Uuid>().ok());

        match account_id {
            Some(id) => Ok(AuthAccount(id)),
            None => Err((
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Missing or invalid x-account-id header" })),
            )),
        }
    }
}

/// Gate for administrative operations (entitlement toggles).
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get("x-admin-api-key")
        .and_then(|value| value.to_str().ok());

    match api_key {
        Some(key) if key == state.config.admin_api_key => next.run(request).await,
        _ => {
            tracing::warn!("Failed admin authentication attempt");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "Unauthorized: Invalid or missing admin API key" })),
            )
                .into_response()
        }
    }
}
