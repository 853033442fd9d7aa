pub mod api;
pub mod config;
pub mod models;
pub mod services;
pub mod utils;

use crate::config::SecurityConfig;
use crate::services::pipeline::IngestPipeline;
use crate::services::registry::SignatureRegistry;
use crate::services::storage::StorageService;
use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Slack on top of the largest file limit for multipart framing and the `size` field.
const MULTIPART_OVERHEAD: u64 = 64 * 1024;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_file,
        api::handlers::health::health_check,
        api::handlers::policies::list_policies,
    ),
    components(
        schemas(
            services::reporter::UploadResponse,
            services::reporter::UploadStatus,
            services::reporter::RejectionCategory,
            api::handlers::health::HealthResponse,
            api::handlers::policies::ContentClassView,
        )
    ),
    tags(
        (name = "upload", description = "Validated file intake"),
        (name = "system", description = "Health and policy endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<SecurityConfig>,
    pub registry: Arc<SignatureRegistry>,
    pub pipeline: Arc<IngestPipeline>,
    pub storage: Arc<dyn StorageService>,
}

impl AppState {
    pub fn new(config: SecurityConfig, storage: Arc<dyn StorageService>) -> Self {
        let registry = Arc::new(SignatureRegistry::from_config(&config));
        let pipeline = Arc::new(IngestPipeline::new(storage.clone(), &config));
        Self {
            config: Arc::new(config),
            registry,
            pipeline,
            storage,
        }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if allowed_origins.iter().any(|origin| origin == "*") {
        tracing::warn!("CORS allows any origin");
        return cors.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    cors.allow_origin(origins)
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.largest_upload_limit() + MULTIPART_OVERHEAD;

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/policies", get(api::handlers::policies::list_policies))
        .route("/upload/:class", post(api::handlers::upload::upload_file))
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(axum::extract::DefaultBodyLimit::max(
            usize::try_from(body_limit).unwrap_or(usize::MAX),
        ))
        .with_state(state)
}
