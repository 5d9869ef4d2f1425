use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
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
pub mod credentials;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod policy;
pub mod repository;

// Public (anonymous, read-only + login/signup) and bearer-protected routers.
pub mod routes;
use auth::AuthUser;
use routes::{authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use credentials::{CredentialService, CredentialState};
pub use error::AppError;
pub use repository::{DatabaseState, MemoryDatabase, PostgresDatabase};

/// Every API route lives under this prefix.
pub const API_PREFIX: &str = "/api/v1";

/// ApiDoc
///
/// OpenAPI document aggregated from the `#[utoipa::path]` handlers and the
/// `ToSchema` models; served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login, handlers::signup, handlers::get_me, handlers::update_me,
        handlers::delete_me, handlers::list_posts, handlers::get_post, handlers::create_post,
        handlers::update_post, handlers::delete_post, handlers::list_comments,
        handlers::get_comment, handlers::create_comment, handlers::update_comment,
        handlers::delete_comment
    ),
    components(
        schemas(
            models::Post, models::Comment, models::Role, models::UserRead, models::LoginForm,
            models::SignupRequest, models::UserUpdate, models::PostCreate, models::PostUpdate,
            models::CommentCreate, models::CommentUpdate, models::TokenResponse, models::Detail,
        )
    ),
    tags(
        (name = "blog", description = "Users, posts and comments")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container for everything a request needs: the storage
/// backend, the credential service and the immutable configuration.
#[derive(Clone)]
pub struct AppState {
    /// Storage Layer: opens one unit of work per request.
    pub db: DatabaseState,
    /// Password hashing and bearer tokens, keyed by the startup secret.
    pub credentials: CredentialState,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

impl AppState {
    /// Builds the credential service from `config` and bundles it with the database.
    pub fn new(db: DatabaseState, config: AppConfig) -> Self {
        let credentials = Arc::new(CredentialService::new(&config));
        Self {
            db,
            credentials,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for DatabaseState {
    fn from_ref(app_state: &AppState) -> DatabaseState {
        app_state.db.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.credentials.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects requests to the authenticated routers before the handler runs: if the
/// `AuthUser` extractor fails, the request is answered with 401 and
/// `WWW-Authenticate: Bearer`.
async fn auth_middleware(
    _auth_user: AuthUser,
    request: Request,
    next: Next,
) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware,
/// and registers the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let api = Router::new()
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware
                ))
        );

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", axum::routing::get(|| async { "ok" }))
        .nest(API_PREFIX, api)
        .with_state(state);

    // Observability and correlation layers, outermost first.
    base_router
        .layer(
             ServiceBuilder::new()
                 .layer(SetRequestIdLayer::new(
                     x_request_id.clone(),
                     MakeRequestUuid,
                 ))
                 .layer(
                     TraceLayer::new_for_http()
                         .make_span_with(trace_span_logger)
                         .on_response(
                             DefaultOnResponse::new()
                                 .level(Level::INFO)
                                 .latency_unit(tower_http::LatencyUnit::Millis)
                         )
                 )
                 .layer(PropagateRequestIdLayer::new(x_request_id))
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span factory for `TraceLayer`: correlates every log line of a request through its
/// `x-request-id` alongside the HTTP method and URI.
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
