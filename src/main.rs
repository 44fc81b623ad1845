use sociopedia::{
    AppState, InMemoryRepository, LocalDiskStorage, PostgresRepository, RepositoryState,
    S3StorageClient, StorageState,
    config::{AppConfig, Env, StorageBackend},
    storage::StorageService,
    create_router,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initialises logging, the store and the attachment storage, then
/// serves the router. Every dependency is built here once and passed down in `AppState`.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sociopedia=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for the log aggregator.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Store
    let repo: RepositoryState = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let repo = PostgresRepository::new(pool);
            repo.migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            Arc::new(repo)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Arc::new(InMemoryRepository::new())
        }
    };

    // 4. Attachment storage
    let storage: StorageState = match &config.storage {
        StorageBackend::Disk { root } => Arc::new(LocalDiskStorage::new(root.clone())),
        StorageBackend::S3 {
            endpoint,
            region,
            access_key,
            secret_key,
            bucket,
        } => Arc::new(S3StorageClient::new(endpoint, region, access_key, secret_key, bucket)),
    };
    storage
        .ensure_ready()
        .await
        .expect("FATAL: Attachment storage is not writable.");

    // 5. Router and server
    let port = config.port;
    let app = create_router(AppState::new(config, repo, storage));

    let address = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&address)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {address}");
    tracing::info!("API Documentation (Swagger UI) available at: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
