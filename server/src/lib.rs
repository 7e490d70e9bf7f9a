//! PDF 章节脱敏服务

pub mod config;
pub mod error;
pub mod routes;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use config::AppConfig;
use medredact_core::Redactor;
use medredact_rules::PatternRegistry;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const SERVICE_NAME: &str = "pdf-enhanced-sensitive-content-redactor";

/// multipart 分隔符和表单头的余量
const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub redactor: Redactor,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(registry: Arc<PatternRegistry>, config: AppConfig) -> Self {
        Self {
            redactor: Redactor::new(registry, config.redaction.clone()),
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &PatternRegistry {
        self.redactor.registry()
    }
}

pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let body_limit = state.config.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/sections", get(routes::sections))
        .route("/sensitive-patterns", get(routes::sensitive_patterns))
        .route("/redact-pdf", post(routes::redact_pdf))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
