use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::{error, info};
use uuid::Uuid;

use amity_types::api::UpdateUserRequest;
use amity_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Admin only (enforced by the route layer). Password hashes never leave the
/// DB layer, so the rows are safe to serialize.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let users: Vec<User> = run_blocking(move || {
        let rows = db.db.list_users()?;
        Ok(rows.iter().map(|r| r.to_user()).collect())
    })
    .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user = run_blocking(move || {
        db.db
            .get_user_by_id(&user_id.to_string())?
            .map(|r| r.to_user())
            .ok_or(ApiError::UserNotFound)
    })
    .await?;
    Ok(Json(user))
}

pub async fn get_user_by_email(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user = run_blocking(move || {
        db.db
            .get_user_by_email(&email)?
            .map(|r| r.to_user())
            .ok_or(ApiError::UserNotFound)
    })
    .await?;
    Ok(Json(user))
}

pub async fn update_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let user = run_blocking(move || {
        if let Some(email) = req.email.as_deref() {
            if !email.contains('@') || email.len() < 4 {
                return Err(ApiError::InvalidRequest("email is not valid"));
            }
            if let Some(holder) = db.db.get_user_by_email(email)? {
                if holder.id != user_id.to_string() {
                    return Err(ApiError::EmailTaken);
                }
            }
        }
        db.db
            .update_user(
                &user_id.to_string(),
                req.email.as_deref(),
                req.role.map(|r| r.as_str()),
            )?
            .map(|r| r.to_user())
            .ok_or(ApiError::UserNotFound)
    })
    .await?;
    Ok(Json(user))
}

/// Deletes the account and cascades to its friendships, atomically.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let (row, removed) = run_blocking(move || {
        db.db
            .delete_user_cascade(&user_id.to_string())?
            .ok_or(ApiError::UserNotFound)
    })
    .await?;

    info!(
        "Account {} deleted with {} friendships (by {})",
        user_id, removed, current.email
    );
    Ok(Json(row.to_user()))
}

async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}
