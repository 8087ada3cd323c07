use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iconquiz::{
    abuse, api, auth,
    catalog::Catalog,
    config::{EngineConfig, ServerConfig},
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iconquiz=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting iconquiz...");

    let server_config = ServerConfig::from_env();
    let auth_config = Arc::new(auth::AuthConfig::from_env());
    let abuse_config = Arc::new(abuse::AbuseConfig::from_env());
    let engine_config = EngineConfig::from_env();

    let catalog = match Catalog::load(&server_config.catalog_path) {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!(
                path = %server_config.catalog_path.display(),
                "Cannot start without a catalog: {}",
                e
            );
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new(catalog, engine_config));

    if let Some(limiter) = abuse_config.rate_limiter.clone() {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(limiter.window().max(Duration::from_secs(1)));
            loop {
                interval.tick().await;
                limiter.cleanup().await;
            }
        });
    }

    let app = api::router(state, auth_config, abuse_config)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let listener = match tokio::net::TcpListener::bind(server_config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %server_config.addr, "Failed to bind: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Listening on http://{}", server_config.addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }
    tracing::info!("Shut down");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Ctrl-C received, draining connections");
}
