//! Registration, login, and session management.
//!
//! Mounted without the auth gate; `logout` and `me` validate the session
//! token themselves.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use anyhow::anyhow;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::bearer_token;
use crate::model::{Session, User};
use crate::server::AppState;

const SESSION_TTL_DAYS: i64 = 7;
const MIN_PASSWORD_LEN: usize = 8;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

#[derive(Debug, Deserialize)]
struct Credentials {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct UserResponse {
    id: String,
    email: String,
    created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_hex(),
            email: user.email,
            created_at: user.created_at.to_chrono().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    token: String,
    user: UserResponse,
}

async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::BadRequest(
            "A valid email address is required".to_string(),
        ));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long"
        )));
    }

    let users = state.db.collection::<User>("users");
    if users.find_one(doc! { "email": &email }, None).await?.is_some() {
        return Err(AppError::BadRequest(
            "An account with this email already exists".to_string(),
        ));
    }

    let user = User {
        id: ObjectId::new(),
        email,
        password_hash: hash_password(&body.password)?,
        created_at: DateTime::now(),
    };
    users.insert_one(&user, None).await?;

    info!(user_id = %user.id, "User registered");

    let session = create_session(&state, user.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: session.token,
            user: user.into(),
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> Result<Json<SessionResponse>, AppError> {
    let email = body.email.trim().to_lowercase();

    let user = state
        .db
        .collection::<User>("users")
        .find_one(doc! { "email": &email }, None)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    info!(user_id = %user.id, "User logged in");

    let session = create_session(&state, user.id).await?;
    Ok(Json(SessionResponse {
        token: session.token,
        user: user.into(),
    }))
}

async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;

    state
        .db
        .collection::<Session>("sessions")
        .delete_one(doc! { "token": token }, None)
        .await?;

    Ok(Json(json!({ "message": "Logged out" })))
}

async fn me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<UserResponse>, AppError> {
    let token = bearer_token(&headers).ok_or(AppError::Unauthorized)?;

    let session = state
        .db
        .collection::<Session>("sessions")
        .find_one(doc! { "token": token }, None)
        .await?
        .ok_or(AppError::Unauthorized)?;
    if session.expires_at < DateTime::now() {
        return Err(AppError::Unauthorized);
    }

    let user = state
        .db
        .collection::<User>("users")
        .find_one(doc! { "_id": session.user_id }, None)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(user.into()))
}

async fn create_session(state: &AppState, user_id: ObjectId) -> Result<Session, AppError> {
    let now = DateTime::now();
    let session = Session {
        id: ObjectId::new(),
        token: Uuid::new_v4().simple().to_string(),
        user_id,
        created_at: now,
        expires_at: DateTime::from_millis(
            now.timestamp_millis() + SESSION_TTL_DAYS * 24 * 60 * 60 * 1000,
        ),
    };

    state
        .db
        .collection::<Session>("sessions")
        .insert_one(&session, None)
        .await?;

    Ok(session)
}

/// Hash a password using the Argon2 algorithm.
fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow!("failed to hash password: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against an Argon2 hash.
fn verify_password(password: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(anyhow!("stored password hash is invalid: {e}")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hashing_round_trip() {
        let hash = hash_password("correct horse battery").expect("hashing should succeed");

        assert!(verify_password("correct horse battery", &hash)
            .expect("verification should run"));
        assert!(!verify_password("wrong password", &hash)
            .expect("verification should run"));
    }

    #[test]
    fn test_verify_rejects_garbage_hash() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[test]
    fn test_session_expiry_is_in_the_future() {
        let now = DateTime::now();
        let expires = DateTime::from_millis(
            now.timestamp_millis() + SESSION_TTL_DAYS * 24 * 60 * 60 * 1000,
        );
        assert!(expires > now);
    }
}
