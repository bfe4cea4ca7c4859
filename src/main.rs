use auth_link_service::{
    build_router,
    config::{Environment, LinkConfig},
    services::{LinkService, MemoryStore, MockMailer, ProofVerifier, SmtpMailer, VerificationMailer},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), auth_link_service::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = LinkConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting auth link service"
    );

    let store = Arc::new(MemoryStore::new());

    let mailer: Arc<dyn VerificationMailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            tracing::warn!("No SMTP transport configured, using mock mailer");
            Arc::new(MockMailer::new())
        }
    };

    let verifier = Arc::new(ProofVerifier::new(
        &config.assertion_secret,
        config.challenge_ttl_seconds,
    ));

    let links = LinkService::new(
        store.clone(),
        mailer,
        verifier,
        config.base_url.clone(),
    );

    let caches = Arc::new(auth_link_service::services::SettingsCaches::new());

    if config.environment == Environment::Dev {
        tracing::info!("Development mode: admin key and assertion secret use dev defaults");
    }

    let state = AppState {
        config: config.clone(),
        store,
        links,
        caches,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true)
                .json()
                .flatten_event(true),
        )
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
