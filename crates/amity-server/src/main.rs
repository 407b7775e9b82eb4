use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use amity_api::auth::{self, AppState, AppStateInner};
use amity_api::friendship;
use amity_api::middleware::{authenticate, require_admin, require_auth};
use amity_api::token::TokenCodec;
use amity_api::users;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amity=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let jwt_secret = std::env::var("AMITY_JWT_SECRET")
        .unwrap_or_else(|_| "YW1pdHktZGV2LXNlY3JldC1jaGFuZ2UtbWUtMDEyMzQ1Njc4OQ==".into());
    let ttl_secs: i64 = std::env::var("AMITY_TOKEN_TTL_SECS")
        .unwrap_or_else(|_| "86400".into())
        .parse()?;
    let db_path = std::env::var("AMITY_DB_PATH").unwrap_or_else(|_| "amity.db".into());
    let host = std::env::var("AMITY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("AMITY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database and token codec
    let db = amity_db::Database::open(&PathBuf::from(&db_path))?;
    let tokens = TokenCodec::new(&jwt_secret, ttl_secs)?;

    // Shared state
    let app_state: AppState = Arc::new(AppStateInner { db, tokens });

    // Routes
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .with_state(app_state.clone());

    let admin_routes = Router::new()
        .route("/api/users", get(users::list_users))
        .layer(middleware::from_fn(require_admin))
        .with_state(app_state.clone());

    let protected_routes = Router::new()
        .route("/api/users/{user_id}", get(users::get_user))
        .route("/api/users/{user_id}", put(users::update_user))
        .route("/api/users/{user_id}", delete(users::delete_user))
        .route("/api/users/by-email/{email}", get(users::get_user_by_email))
        .route("/api/users/{user_id}/friendships", get(friendship::list))
        .route("/api/users/{user_id}/friendships/{friend_id}", post(friendship::create))
        .route("/api/users/{user_id}/friendships/{friend_id}", delete(friendship::delete))
        .layer(middleware::from_fn(require_auth))
        .with_state(app_state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(app_state, authenticate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Amity server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
