use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::debug;
use uuid::Uuid;

use amity_db::Database;
use amity_types::models::Role;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::token::TokenCodec;

/// The authenticated identity bound to a request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Per-request authentication decision.
///
/// A missing header or one without the bearer scheme is not an error: the
/// request proceeds anonymous and the access-control layer decides. A token
/// that fails signature verification is always an error. A verified token
/// whose subject is unknown, or which has expired, proceeds anonymous.
pub fn resolve_principal(
    db: &Database,
    codec: &TokenCodec,
    auth_header: Option<&str>,
) -> Result<Option<CurrentUser>, ApiError> {
    let Some(header) = auth_header else {
        return Ok(None);
    };
    let Some(token) = header.strip_prefix("Bearer ") else {
        debug!("Authorization header without bearer scheme, proceeding anonymous");
        return Ok(None);
    };

    let claims = codec.verify(token)?;
    if codec.is_expired(&claims) {
        debug!("Expired token for subject {}", claims.sub);
        return Ok(None);
    }

    let Some(row) = db.get_user_by_email(&claims.sub)? else {
        debug!("Token subject {} does not resolve to an account", claims.sub);
        return Ok(None);
    };
    let user = row.to_user();
    Ok(Some(CurrentUser {
        id: user.id,
        email: user.email,
        role: user.role,
    }))
}

/// Runs on every request; binds the principal as an extension when the bearer
/// token checks out, otherwise lets the request through anonymous. Malformed
/// tokens are rejected here, never silently dropped.
pub async fn authenticate(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let resolved = tokio::task::spawn_blocking(move || {
        resolve_principal(&state.db, &state.tokens, auth_header.as_deref())
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))??;

    if let Some(user) = resolved {
        req.extensions_mut().insert(user);
    }
    Ok(next.run(req).await)
}

/// Access decision for protected routes: any authenticated principal passes.
pub fn check_authenticated(user: Option<&CurrentUser>) -> Result<(), ApiError> {
    match user {
        Some(_) => Ok(()),
        None => Err(ApiError::Unauthenticated),
    }
}

/// Access decision for admin-only routes; checks the enumerated role.
pub fn check_admin(user: Option<&CurrentUser>) -> Result<(), ApiError> {
    match user {
        Some(user) if user.role == Role::Admin => Ok(()),
        Some(_) => Err(ApiError::Forbidden),
        None => Err(ApiError::Unauthenticated),
    }
}

/// Rejects anonymous requests on protected routes.
pub async fn require_auth(req: Request, next: Next) -> Result<Response, ApiError> {
    check_authenticated(req.extensions().get::<CurrentUser>())?;
    Ok(next.run(req).await)
}

/// Role gate for admin-only routes.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    check_admin(req.extensions().get::<CurrentUser>())?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Database, TokenCodec) {
        let db = Database::open_in_memory().unwrap();
        let codec = TokenCodec::new("dGVzdC1zZWNyZXQtMDEyMzQ1Njc4OWFiY2RlZg==", 3600).unwrap();
        db.create_user(
            "11111111-1111-1111-1111-111111111111",
            "alice@example.com",
            "hash",
            "ADMIN",
        )
        .unwrap();
        (db, codec)
    }

    #[test]
    fn missing_or_non_bearer_header_is_anonymous() {
        let (db, codec) = setup();
        assert!(resolve_principal(&db, &codec, None).unwrap().is_none());
        assert!(resolve_principal(&db, &codec, Some("Basic xyz")).unwrap().is_none());
        assert!(resolve_principal(&db, &codec, Some("bearer lowercase")).unwrap().is_none());
    }

    #[test]
    fn garbage_bearer_token_is_an_error() {
        let (db, codec) = setup();
        let err = resolve_principal(&db, &codec, Some("Bearer garbage")).unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken));
    }

    #[test]
    fn valid_token_binds_the_principal() {
        let (db, codec) = setup();
        let token = codec.issue("alice@example.com", Role::Admin).unwrap();
        let header = format!("Bearer {token}");

        let user = resolve_principal(&db, &codec, Some(&header)).unwrap().unwrap();
        assert_eq!(user.email, "alice@example.com");
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn unknown_subject_is_anonymous() {
        let (db, codec) = setup();
        let token = codec.issue("ghost@example.com", Role::User).unwrap();
        let header = format!("Bearer {token}");

        assert!(resolve_principal(&db, &codec, Some(&header)).unwrap().is_none());
    }

    #[test]
    fn anonymous_requests_fail_the_auth_gate() {
        assert!(matches!(
            check_authenticated(None),
            Err(ApiError::Unauthenticated)
        ));
        assert!(matches!(check_admin(None), Err(ApiError::Unauthenticated)));
    }

    #[test]
    fn user_role_is_forbidden_on_the_admin_gate() {
        let user = CurrentUser {
            id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            role: Role::User,
        };
        assert!(check_authenticated(Some(&user)).is_ok());
        assert!(matches!(check_admin(Some(&user)), Err(ApiError::Forbidden)));
    }

    #[test]
    fn admin_role_passes_both_gates() {
        let admin = CurrentUser {
            id: Uuid::new_v4(),
            email: "root@example.com".into(),
            role: Role::Admin,
        };
        assert!(check_authenticated(Some(&admin)).is_ok());
        assert!(check_admin(Some(&admin)).is_ok());
    }

    #[test]
    fn expired_token_is_anonymous_not_invalid() {
        let (db, _) = setup();
        let expired = TokenCodec::new("dGVzdC1zZWNyZXQtMDEyMzQ1Njc4OWFiY2RlZg==", -60).unwrap();
        let token = expired.issue("alice@example.com", Role::Admin).unwrap();
        let header = format!("Bearer {token}");

        assert!(resolve_principal(&db, &expired, Some(&header)).unwrap().is_none());
    }
}
