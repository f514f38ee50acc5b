mod admin;
mod agents;
mod auth;
mod bootstrap;
mod health;
mod provider;
mod reconciler;
mod uploads;
mod webhooks;

use anyhow::Result;
use axum::Router;
use calldeck_core::config::{AppConfig, LoadOptions};
use tower_http::cors::CorsLayer;

fn init_logging(config: &AppConfig) {
    use calldeck_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Load config and initialize logging before any other operations.
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let router = build_router(&app);

    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!(
        event_name = "system.server.started",
        bind_address = %address,
        "calldeck server listening"
    );

    axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;

    tracing::info!(event_name = "system.server.stopping", "calldeck server stopping");
    Ok(())
}

fn build_router(app: &bootstrap::Application) -> Router {
    let verifier = auth::AuthVerifier::from_config(&app.config.auth);
    let provider_client = provider::ProviderClient::from_config(&app.config.provider);
    let reconciler = reconciler::EventReconciler::new(app.db_pool.clone());

    Router::new()
        .merge(health::router(app.db_pool.clone()))
        .merge(auth::router(app.db_pool.clone(), verifier.clone()))
        .merge(agents::router(app.db_pool.clone(), verifier.clone()))
        .merge(uploads::router(
            app.db_pool.clone(),
            verifier.clone(),
            provider_client,
            app.config.uploads.dir.clone(),
        ))
        .merge(admin::router(app.db_pool.clone(), verifier))
        .merge(webhooks::router(reconciler, app.config.provider.webhook_secret.clone()))
        .layer(CorsLayer::permissive())
}

async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
