//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{DbAdapter, DbAuthAdapter},
    config::{Config, DataBackend},
    error::ApiError,
    web::{
        health_handler, list_quiz_results_handler, list_students_handler, require_auth, rest::ApiDoc,
        state::ServiceState, ws_handler,
    },
};
use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use axum::{middleware as axum_middleware, routing::get, Router};
use eduquest_core::memory::MemoryBackend;
use eduquest_core::ports::{AuthService, ProfileStore};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // --- 2. Initialize the Data Backend ---
    let (auth, store): (Arc<dyn AuthService>, Arc<dyn ProfileStore>) = match &config.backend {
        DataBackend::Postgres { database_url } => {
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(database_url)
                .await?;
            let db_adapter = Arc::new(DbAdapter::new(db_pool.clone()));
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            info!("Database migrations complete.");
            let auth_adapter = Arc::new(DbAuthAdapter::new(db_pool, config.session_ttl));
            (
                auth_adapter as Arc<dyn AuthService>,
                db_adapter as Arc<dyn ProfileStore>,
            )
        }
        DataBackend::Memory => {
            warn!("Using the in-memory backend. It is for development only: all data is lost on restart and passwords are hashed at minimum cost.");
            let backend = Arc::new(MemoryBackend::with_session_ttl(config.session_ttl));
            (
                backend.clone() as Arc<dyn AuthService>,
                backend as Arc<dyn ProfileStore>,
            )
        }
    };

    // --- 3. Build the Shared State ---
    let state = Arc::new(ServiceState {
        auth,
        store,
        config: config.clone(),
    });

    let origin = config.allowed_origin.parse::<HeaderValue>().map_err(|e| {
        ApiError::Internal(format!(
            "ALLOWED_ORIGIN '{}' is not a valid header value: {}",
            config.allowed_origin, e
        ))
    })?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT]);

    // --- 4. Create the Web Router ---
    // Public routes (no auth required). The socket authenticates through its own messages.
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler));

    // Protected routes (bearer token required)
    let protected_routes = Router::new()
        .route(
            "/profiles/{profile_id}/quiz-results",
            get(list_quiz_results_handler),
        )
        .route("/students", get(list_students_handler))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ));

    let api_router = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(cors)
        .with_state(state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 5. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
