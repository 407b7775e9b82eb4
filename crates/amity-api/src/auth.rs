use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use amity_db::Database;
use amity_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use amity_types::models::Role;

use crate::error::ApiError;
use crate::token::TokenCodec;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: TokenCodec,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, token) = register_account(&state, &req.email, &req.password)?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id, token })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user_id, token) = login_account(&state, &req.email, &req.password)?;
    Ok(Json(LoginResponse {
        user_id,
        email: req.email,
        token,
    }))
}

/// Creates the account with role USER and a salted argon2 hash, then issues a
/// token. Registration logs the user in.
pub fn register_account(
    state: &AppStateInner,
    email: &str,
    password: &str,
) -> Result<(Uuid, String), ApiError> {
    if !email.contains('@') || email.len() < 4 {
        return Err(ApiError::InvalidRequest("email is not valid"));
    }
    if password.len() < 8 {
        return Err(ApiError::InvalidRequest(
            "password must be at least 8 characters",
        ));
    }

    if state.db.get_user_by_email(email)?.is_some() {
        return Err(ApiError::EmailTaken);
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("hash password: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    let created = state
        .db
        .create_user(&user_id.to_string(), email, &password_hash, Role::User.as_str())?;
    if !created {
        // lost the race to a concurrent registration of the same email
        return Err(ApiError::EmailTaken);
    }

    let token = state.tokens.issue(email, Role::User)?;
    info!("Registered account {} ({})", user_id, email);
    Ok((user_id, token))
}

/// Looks the account up by email and checks the password against the stored
/// hash. Absent account and wrong password are indistinguishable to the caller.
pub fn login_account(
    state: &AppStateInner,
    email: &str,
    password: &str,
) -> Result<(Uuid, String), ApiError> {
    let user = state
        .db
        .get_user_by_email(email)?
        .ok_or(ApiError::AuthenticationFailed)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::AuthenticationFailed)?;

    let role = user.to_user().role;
    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("corrupt user id '{}': {}", user.id, e))?;

    let token = state.tokens.issue(email, role)?;
    Ok((user_id, token))
}
