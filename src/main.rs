use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use axum::{routing::get, routing::post, Json, Router};
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod db;
mod engine;
mod error;
mod facade;
mod handlers;
mod middleware;
mod rate_limit;
mod rating;
mod scorer;
mod store;
mod threshold;
mod validation;

use config::Config;
use facade::SessionFacade;
use store::{PgTicketStore, TicketStore};

/// Shared application state, threaded through every handler via `State`.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub config: Arc<Config>,
    pub facade: Arc<SessionFacade>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = Config::from_env().expect("Failed to load configuration from environment");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    tracing::info!("Configuration loaded successfully");

    let db_pool = db::create_pool(&config).await.expect("Failed to create database pool");
    tracing::info!(
        max_connections = config.db_max_connections,
        min_connections = config.db_min_connections,
        "Database pool created"
    );

    db::run_migrations(&db_pool).await.expect("Failed to run database migrations");

    let allowed_origins_config = config.allowed_origins.clone();
    let config = Arc::new(config);

    let store: Arc<dyn TicketStore> = Arc::new(PgTicketStore::new(db_pool.clone()));
    let facade = Arc::new(SessionFacade::new(store, config.clone()));

    let state = AppState {
        db_pool,
        config: config.clone(),
        facade,
    };

    let allowed_origins: Vec<HeaderValue> = allowed_origins_config
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins.clone()))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("content-type"),
            HeaderName::from_static("accept"),
            HeaderName::from_static("origin"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600));

    tracing::info!("CORS configured for origins: {:?}", allowed_origins_config);

    let matchmaking_routes = Router::new()
        .route("/match", post(handlers::matchmaking::post_match))
        .route("/match/stream", post(handlers::matchmaking::post_match_stream))
        .route("/match/start", post(handlers::matchmaking::post_match_start))
        .route("/match/finish", post(handlers::matchmaking::post_match_finish))
        .route("/match/cancel/:match_id", get(handlers::matchmaking::get_match_cancel))
        .layer(rate_limit::RateLimitLayer::matchmaking());

    let health_routes = Router::new()
        .route("/api/health", get(handlers::matchmaking::api_health))
        .route("/ready", get(ready_handler));

    let general_routes = Router::new()
        .route("/", get(root_handler))
        .layer(rate_limit::RateLimitLayer::general());

    let app = Router::new()
        .merge(health_routes)
        .merge(matchmaking_routes)
        .merge(general_routes)
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(axum::middleware::from_fn(middleware::request_id))
        .layer(axum::middleware::from_fn(middleware::request_timing))
        .layer(cors)
        .with_state(state);

    tracing::info!("Rate limiting enabled: matchmaking=10/s, general=100/s");

    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(4000);

    let addr: SocketAddr = format!("{host}:{port}").parse().expect("Invalid HOST:PORT configuration");

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    let shutdown_signal = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }

        tracing::info!("Shutdown signal received, starting graceful shutdown...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .unwrap();

    tracing::info!("Server shut down gracefully");
}

async fn root_handler() -> &'static str {
    "matchcore is running"
}

/// Readiness check — verifies database connectivity.
async fn ready_handler(axum::extract::State(state): axum::extract::State<AppState>) -> impl axum::response::IntoResponse {
    match sqlx::query("SELECT 1").execute(&state.db_pool).await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected",
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string(),
            })),
        ),
    }
}
