pub mod config;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::LinkConfig;
use crate::error::AppError;
use crate::services::{LinkService, RegistryStore, SettingsCaches};

#[derive(Clone)]
pub struct AppState {
    pub config: LinkConfig,
    pub store: Arc<dyn RegistryStore>,
    pub links: LinkService,
    pub caches: Arc<SettingsCaches>,
}

pub fn build_router(state: AppState) -> Router {
    let admin_routes = Router::new()
        .route(
            "/admin/accounts/:account_id/api-key-entitlement",
            post(handlers::admin::set_api_key_entitlement),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::admin_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(handlers::accounts::create_account))
        .route("/settings", get(handlers::methods::get_settings))
        .route(
            "/settings/preferences",
            put(handlers::methods::update_preference),
        )
        .route(
            "/settings/auth-methods",
            get(handlers::methods::get_auth_methods),
        )
        .route(
            "/settings/auth-methods/email",
            post(handlers::email::request_email_link),
        )
        // The verification callback arrives from the mail recipient, not
        // the authenticated session.
        .route(
            "/settings/auth-methods/email/verify",
            get(handlers::email::verify_email_link),
        )
        .route(
            "/settings/auth-methods/unlink-challenge",
            delete(handlers::link::abandon_unlink),
        )
        .route(
            "/settings/auth-methods/:provider/challenge",
            get(handlers::link::issue_challenge),
        )
        .route(
            "/settings/auth-methods/:provider/link",
            post(handlers::link::link_provider),
        )
        .route(
            "/settings/auth-methods/:provider/unlink",
            post(handlers::link::unlink_provider),
        )
        .route(
            "/settings/api-key",
            post(handlers::api_key::generate_api_key)
                .delete(handlers::api_key::revoke_api_key),
        )
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .allowed_origins
                        .iter()
                        .filter_map(|o| o.parse::<HeaderValue>().ok())
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::CONTENT_TYPE,
                    axum::http::header::HeaderName::from_static("x-account-id"),
                    axum::http::header::HeaderName::from_static("x-admin-api-key"),
                    axum::http::header::HeaderName::from_static("x-api-key"),
                ]),
        )
}

/// Service health check
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::TransientStorage(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
    })))
}
