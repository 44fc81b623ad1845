use axum::{
    Router,
    extract::{DefaultBodyLimit, FromRef},
    http::HeaderName,
};
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod repository;
pub mod storage;

// Routing split by what each route group puts in front of its handlers.
pub mod routes;
use routes::{authenticated, public, uploads};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use repository::{InMemoryRepository, PostgresRepository, RepositoryState};
pub use storage::{LocalDiskStorage, MockStorageService, S3StorageClient, StorageState};

use auth::{CredentialVerifier, TokenIssuer};
use config::StorageBackend;
use ingest::AttachmentIngestor;

/// ApiDoc
///
/// OpenAPI document for every handler, served at `/api-docs/openapi.json` and rendered by
/// Swagger UI at `/swagger-ui`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::get_user, handlers::create_post,
        handlers::get_feed, handlers::get_user_posts,
    ),
    components(
        schemas(
            models::RegisterUserRequest, models::LoginRequest, models::LoginResponse,
            models::CreatePostRequest, models::CreatedUser, models::CreatedPost,
            models::UserProfile, models::Post, models::AttachmentRef,
        )
    ),
    tags(
        (name = "sociopedia", description = "Sociopedia API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, built once in `main` and cloned into each request.
/// Nothing in the crate reads configuration or connections from globals.
#[derive(Clone)]
pub struct AppState {
    pub repo: RepositoryState,
    pub storage: StorageState,
    pub config: AppConfig,
    pub verifier: Arc<CredentialVerifier>,
    pub issuer: Arc<TokenIssuer>,
    pub ingestor: Arc<AttachmentIngestor>,
}

impl AppState {
    /// Derives the verifier, issuer and ingestor from `config` and bundles them with the
    /// store and the storage backend.
    pub fn new(config: AppConfig, repo: RepositoryState, storage: StorageState) -> Self {
        Self {
            verifier: Arc::new(CredentialVerifier::new(&config.jwt_secret)),
            issuer: Arc::new(TokenIssuer::new(&config.jwt_secret, config.token_ttl)),
            ingestor: Arc::new(AttachmentIngestor::new(
                config.staging_root.clone(),
                config.max_upload_bytes,
                config.ingest_timeout,
            )),
            repo,
            storage,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

// Read-only handlers extract the store alone.
impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

/// create_router
///
/// Assembles the routing structure, applies global middleware and registers the state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let mut base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // No pipeline.
        .merge(public::public_routes())
        // Routes that accept an attachment; each declares its own stage order.
        .merge(uploads::upload_routes(&state))
        // Verify-only pipeline.
        .merge(authenticated::authenticated_routes(&state))
        // Axum's 2 MB default would cut uploads short of the configured ceiling.
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes));

    // Disk-backed attachments are served straight from the store root.
    if let StorageBackend::Disk { root } = &state.config.storage {
        base_router = base_router.nest_service(storage::ASSETS_PREFIX, ServeDir::new(root));
    }

    base_router
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Opens the `http_request` span for `TraceLayer`, tagging it with the `x-request-id`
/// set by `SetRequestIdLayer` so every log line of one request can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
