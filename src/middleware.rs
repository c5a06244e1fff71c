use axum::extract::{Request, State};
use axum::http::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::DateTime;
use serde_json::json;
use tracing::warn;

use crate::error::AppError;
use crate::model::Session;
use crate::server::AppState;

/// Identity of the authenticated caller, attached to request extensions by
/// the auth gate.
#[derive(Debug, Clone, Copy)]
pub struct CurrentUser {
    pub id: ObjectId,
}

/// Extract the bearer token from the `Authorization` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Authentication gate applied to every protected route group.
///
/// Validates the session token against the sessions collection and attaches
/// a [`CurrentUser`] for handlers; missing, unknown, or expired tokens halt
/// the chain with a 401 before any route logic runs.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers()).ok_or_else(|| {
        warn!("Missing or malformed Authorization header");
        AppError::Unauthorized
    })?;

    let session = state
        .db
        .collection::<Session>("sessions")
        .find_one(doc! { "token": token }, None)
        .await?
        .ok_or_else(|| {
            warn!("Unknown session token");
            AppError::Unauthorized
        })?;

    if session.expires_at < DateTime::now() {
        warn!(user_id = %session.user_id, "Expired session token");
        return Err(AppError::Unauthorized);
    }

    req.extensions_mut().insert(CurrentUser {
        id: session.user_id,
    });

    Ok(next.run(req).await)
}

/// Set the baseline security headers on every response.
///
/// `Strict-Transport-Security` is added only in production, where the app is
/// expected to sit behind TLS.
pub async fn secure_headers(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let production = state.config.environment.is_production();

    let mut res = next.run(req).await;
    let headers = res.headers_mut();
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-XSS-Protection",
        HeaderValue::from_static("1; mode=block"),
    );
    if production {
        headers.insert(
            "Strict-Transport-Security",
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }

    res
}

/// Terminal error-shaping stage.
///
/// In production any server-error response is replaced with a generic body
/// so internals are never disclosed; in development the handler's message
/// and error chain pass through untouched.
pub async fn shape_errors(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let res = next.run(req).await;

    if state.config.environment.is_production() && res.status().is_server_error() {
        let status = res.status();
        return (status, Json(json!({ "message": "Internal Server Error" }))).into_response();
    }

    res
}
