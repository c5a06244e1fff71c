//! Request pipeline assembly, listener lifecycle, and graceful shutdown.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use mongodb::{Client, Database};
use serde_json::{json, Value};
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db;
use crate::middleware::{require_auth, secure_headers, shape_errors};
use crate::routes;

/// Request bodies above this are rejected before route logic runs.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Built frontend served in production, with `index.html` as SPA fallback.
const FRONTEND_DIR: &str = "frontend/build";

/// Application state shared across all routes
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: AppConfig,
    pub started_at: Instant,
}

/// Bind the listener and serve until a termination signal arrives.
///
/// Shutdown is strictly sequential: the listener stops accepting and drains
/// in-flight requests, then the database connection is closed, then this
/// function returns and the process exits 0.
pub async fn serve(config: AppConfig, client: Client) -> Result<()> {
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        address = %addr,
        environment = %config.environment,
        "Server listening"
    );

    run(listener, config, client, shutdown_signal()).await
}

/// Serve on an already-bound listener until `shutdown` resolves.
///
/// Split from [`serve`] so tests can inject the listener and the shutdown
/// trigger and observe the drain-then-close ordering.
pub async fn run<F>(
    listener: tokio::net::TcpListener,
    config: AppConfig,
    client: Client,
    shutdown: F,
) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let state = AppState {
        db: db::database(&client),
        config,
        started_at: Instant::now(),
    };
    let app = build_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    // In-flight requests have completed; handlers can no longer run, so the
    // database connection is safe to close.
    info!("HTTP listener closed");
    db::close(client).await;
    info!("Shutdown complete");

    Ok(())
}

/// Assemble the fixed-order request pipeline.
///
/// Stage order is set once here and never changes at runtime: body-size
/// ceiling, request tracing, CORS, security headers, error shaping, then the
/// routes (health, auth, gated groups) and the terminal fallback.
pub fn build_router(state: AppState) -> Router {
    let gate = from_fn_with_state(state.clone(), require_auth);

    let api = Router::new()
        .nest("/auth", routes::auth::router())
        .nest("/tasks", routes::tasks::router().route_layer(gate.clone()))
        .nest("/habits", routes::habits::router().route_layer(gate.clone()))
        .nest("/goals", routes::goals::router().route_layer(gate.clone()))
        .nest("/analytics", routes::analytics::router().route_layer(gate));

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api", api);

    // Production serves the built frontend and lets client-side routing
    // resolve anything unmatched; development answers 404 JSON instead.
    let app = if state.config.environment.is_production() {
        let frontend = Path::new(FRONTEND_DIR);
        app.fallback_service(
            ServeDir::new(frontend).fallback(ServeFile::new(frontend.join("index.html"))),
        )
    } else {
        app.fallback(not_found)
    };

    app.layer(from_fn_with_state(state.clone(), shape_errors))
        .layer(from_fn_with_state(state.clone(), secure_headers))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    // `AppConfig::from_env` rejects unparseable origins at startup; this arm
    // only fires for state assembled some other way.
    let origins: Vec<HeaderValue> = match config.client_url.parse::<HeaderValue>() {
        Ok(origin) => vec![origin],
        Err(_) => {
            warn!(
                client_url = %config.client_url,
                "CLIENT_URL is not a valid header value; cross-origin requests will be refused"
            );
            Vec::new()
        }
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Liveness probe; no authentication.
async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "OK",
        "environment": state.config.environment.to_string(),
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs_f64(),
    }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Route not found" })),
    )
}

/// Resolves when SIGINT or SIGTERM arrives, triggering graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received, shutting down gracefully"),
        _ = terminate => info!("SIGTERM received, shutting down gracefully"),
    }
}
