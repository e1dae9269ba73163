mod config;
mod error;
mod rate_limit;
mod retention;
mod routes;

use std::sync::Arc;

use config::AppConfig;
use routes::{app_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Only load .env in development; production uses platform-native env injection.
    #[cfg(debug_assertions)]
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("inksync_api=info".parse().expect("valid directive"))
                .add_directive("inksync_core=info".parse().expect("valid directive")),
        )
        .init();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!("Starting inksync-api with config: {:?}", config);

    let state = AppState::from_config(config).await?;
    let _sweep = retention::spawn_retention_sweep(
        state.engine.clone(),
        state.config.retention_sweep_interval,
    );

    let bind_addr = state.config.bind_addr.clone();
    let router = app_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("inksync-api listening on {}", bind_addr);
    axum::serve(listener, router).await?;
    Ok(())
}
