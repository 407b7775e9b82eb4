use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error taxonomy for the API. Every domain failure keeps its own variant so
/// callers can tell them apart. Infrastructure failures collapse into
/// `Internal` and leak no detail to the client.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The token was present but malformed, unsigned, or tampered with.
    #[error("invalid or malformed token")]
    InvalidToken,

    /// Bad credentials at login.
    #[error("invalid email or password")]
    AuthenticationFailed,

    /// Protected route reached without an authenticated principal.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated, but the role does not grant this operation.
    #[error("insufficient role")]
    Forbidden,

    /// Registration or update with an email that is already taken.
    #[error("an account with this email already exists")]
    EmailTaken,

    /// Malformed request payload.
    #[error("{0}")]
    InvalidRequest(&'static str),

    #[error("cannot find a user with this id")]
    UserNotFound,

    #[error("cannot create a friendship with the same user")]
    SameUserFriendship,

    #[error("this friendship already exists")]
    ExistingFriendship,

    #[error("this friendship doesn't exist")]
    NotExistingFriendship,

    /// Storage or other infrastructure failure; not a domain error.
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Stable machine-readable kind, part of the API contract.
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::InvalidToken => "invalid_token",
            ApiError::AuthenticationFailed => "authentication_failed",
            ApiError::Unauthenticated => "unauthenticated",
            ApiError::Forbidden => "forbidden",
            ApiError::EmailTaken => "email_taken",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::UserNotFound => "user_not_found",
            ApiError::SameUserFriendship => "same_user_friendship",
            ApiError::ExistingFriendship => "existing_friendship",
            ApiError::NotExistingFriendship => "not_existing_friendship",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidToken
            | ApiError::AuthenticationFailed
            | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::EmailTaken => StatusCode::CONFLICT,
            ApiError::InvalidRequest(_)
            | ApiError::SameUserFriendship
            | ApiError::ExistingFriendship => StatusCode::BAD_REQUEST,
            ApiError::UserNotFound | ApiError::NotExistingFriendship => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(ref e) = self {
            error!("internal error: {:#}", e);
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}
