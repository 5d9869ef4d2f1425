use blog_backend::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{DatabaseState, MemoryDatabase, PostgresDatabase},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Initializes configuration, logging, storage and the HTTP server, in that order.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail fast: no signing secret, no server).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "blog_backend=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Storage: Postgres when configured, otherwise the in-memory store (local only).
    let db: DatabaseState = match &config.db_url {
        Some(url) => {
            let pg = PostgresDatabase::connect(url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            pg.migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store (data is not persisted)");
            Arc::new(MemoryDatabase::new())
        }
    };

    // 4. State, router and server.
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState::new(db, config));

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener. Check BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly");
}
