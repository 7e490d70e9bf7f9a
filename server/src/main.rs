use anyhow::{Context, Result};
use medredact_rules::PatternRegistry;
use medredact_server::config::AppConfig;
use medredact_server::{build_app, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("Failed to load configuration")?;

    // fmt 层同时接收 log 宏的输出
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_filter.clone().into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let registry = PatternRegistry::builtin().context("Failed to compile pattern registry")?;
    tracing::info!(
        version = registry.version(),
        target_sections = registry.target_sections().len(),
        sensitive_patterns = registry.sensitive_rules().len(),
        "Pattern registry loaded"
    );

    let addr = config.bind_addr();
    let app = build_app(AppState::new(Arc::new(registry), config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
