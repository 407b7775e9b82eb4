use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

use amity_db::Database;
use amity_db::queries::FriendshipInsert;
use amity_types::models::{Friendship, FriendshipStatus};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Creates the undirected relation between two distinct, existing accounts.
/// Check order matters: a self-relation is rejected before anything else, so
/// it holds even for ids that don't exist.
pub fn create_friendship(db: &Database, user1: Uuid, user2: Uuid) -> Result<Friendship, ApiError> {
    if user1 == user2 {
        return Err(ApiError::SameUserFriendship);
    }
    if !db.both_users_exist(&user1.to_string(), &user2.to_string())? {
        return Err(ApiError::UserNotFound);
    }

    let id = Uuid::new_v4();
    let created_at = Utc::now();
    let outcome = db.insert_friendship(
        &id.to_string(),
        &user1.to_string(),
        &user2.to_string(),
        FriendshipStatus::Pending.as_str(),
        &created_at.to_rfc3339(),
    )?;
    match outcome {
        FriendshipInsert::Created => {}
        // already present in either order, or lost the race to a concurrent create
        FriendshipInsert::DuplicatePair => return Err(ApiError::ExistingFriendship),
        // a party was deleted between the existence check and the insert
        FriendshipInsert::MissingAccount => return Err(ApiError::UserNotFound),
    }

    Ok(Friendship {
        id,
        user_a: user1,
        user_b: user2,
        status: FriendshipStatus::Pending,
        created_at,
    })
}

/// Deletes the relation regardless of the order it was stored or asked for.
pub fn delete_friendship(db: &Database, user1: Uuid, user2: Uuid) -> Result<(), ApiError> {
    if !db.both_users_exist(&user1.to_string(), &user2.to_string())? {
        return Err(ApiError::UserNotFound);
    }
    if !db.delete_friendship(&user1.to_string(), &user2.to_string())? {
        return Err(ApiError::NotExistingFriendship);
    }
    Ok(())
}

/// Every friendship where the account appears as either party, in storage order.
pub fn list_friendships(db: &Database, user: Uuid) -> Result<Vec<Friendship>, ApiError> {
    if !db.user_exists(&user.to_string())? {
        return Err(ApiError::UserNotFound);
    }
    let rows = db.friendships_for_user(&user.to_string())?;
    Ok(rows.iter().map(|r| r.to_friendship()).collect())
}

// -- Handlers --

pub async fn create(
    State(state): State<AppState>,
    Path((user1, user2)): Path<(Uuid, Uuid)>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let friendship = tokio::task::spawn_blocking(move || create_friendship(&db.db, user1, user2))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })??;

    info!(
        "Friendship {} created between {} and {} (by {})",
        friendship.id, user1, user2, current.email
    );
    Ok((StatusCode::CREATED, Json(friendship)))
}

pub async fn delete(
    State(state): State<AppState>,
    Path((user1, user2)): Path<(Uuid, Uuid)>,
    Extension(current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    tokio::task::spawn_blocking(move || delete_friendship(&db.db, user1, user2))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })??;

    info!(
        "Friendship between {} and {} deleted (by {})",
        user1, user2, current.email
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(
    State(state): State<AppState>,
    Path(user): Path<Uuid>,
    Extension(_current): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let friendships = tokio::task::spawn_blocking(move || list_friendships(&db.db, user))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })??;

    Ok(Json(friendships))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn db_with_accounts(n: usize) -> (Database, Vec<Uuid>) {
        let db = Database::open_in_memory().unwrap();
        let ids: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        for (i, id) in ids.iter().enumerate() {
            db.create_user(
                &id.to_string(),
                &format!("user{i}@example.com"),
                "hash",
                "USER",
            )
            .unwrap();
        }
        (db, ids)
    }

    #[test]
    fn create_rejects_self_relation_even_for_unknown_ids() {
        let (db, _) = db_with_accounts(0);
        let ghost = Uuid::new_v4();
        let err = create_friendship(&db, ghost, ghost).unwrap_err();
        assert!(matches!(err, ApiError::SameUserFriendship));
    }

    #[test]
    fn create_requires_both_accounts_to_exist() {
        let (db, ids) = db_with_accounts(1);
        let ghost = Uuid::new_v4();

        let err = create_friendship(&db, ids[0], ghost).unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
        let err = create_friendship(&db, ghost, ids[0]).unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
    }

    #[test]
    fn swapped_argument_order_cannot_create_a_duplicate() {
        let (db, ids) = db_with_accounts(2);
        let (a, b) = (ids[0], ids[1]);

        let friendship = create_friendship(&db, a, b).unwrap();
        assert_eq!(friendship.status, FriendshipStatus::Pending);
        assert_eq!(friendship.user_a, a);
        assert_eq!(friendship.user_b, b);

        let err = create_friendship(&db, b, a).unwrap_err();
        assert!(matches!(err, ApiError::ExistingFriendship));
        let err = create_friendship(&db, a, b).unwrap_err();
        assert!(matches!(err, ApiError::ExistingFriendship));
    }

    #[test]
    fn delete_is_order_insensitive_and_one_shot() {
        let (db, ids) = db_with_accounts(2);
        let (a, b) = (ids[0], ids[1]);
        create_friendship(&db, a, b).unwrap();

        delete_friendship(&db, b, a).unwrap();
        let err = delete_friendship(&db, a, b).unwrap_err();
        assert!(matches!(err, ApiError::NotExistingFriendship));
    }

    #[test]
    fn delete_requires_both_accounts_to_exist() {
        let (db, ids) = db_with_accounts(1);
        let ghost = Uuid::new_v4();
        let err = delete_friendship(&db, ids[0], ghost).unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
    }

    #[test]
    fn list_returns_relations_from_both_sides() {
        let (db, ids) = db_with_accounts(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        create_friendship(&db, a, b).unwrap();
        create_friendship(&db, c, a).unwrap();
        create_friendship(&db, b, c).unwrap();

        let for_a = list_friendships(&db, a).unwrap();
        assert_eq!(for_a.len(), 2);
        assert!(for_a.iter().all(|f| f.user_a == a || f.user_b == a));

        let for_b = list_friendships(&db, b).unwrap();
        assert_eq!(for_b.len(), 2);
    }

    #[test]
    fn list_for_unknown_account_fails() {
        let (db, _) = db_with_accounts(0);
        let err = list_friendships(&db, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApiError::UserNotFound));
    }

    #[test]
    fn recreate_after_delete_succeeds() {
        let (db, ids) = db_with_accounts(2);
        let (a, b) = (ids[0], ids[1]);

        create_friendship(&db, a, b).unwrap();
        delete_friendship(&db, a, b).unwrap();
        create_friendship(&db, b, a).unwrap();
    }

    #[test]
    fn concurrent_creates_store_exactly_one_relation() {
        let (db, ids) = db_with_accounts(2);
        let db = Arc::new(db);
        let (a, b) = (ids[0], ids[1]);

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let db = db.clone();
                // opposite argument orders, racing for the same unordered pair
                std::thread::spawn(move || {
                    if i == 0 {
                        create_friendship(&db, a, b)
                    } else {
                        create_friendship(&db, b, a)
                    }
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        assert!(results.iter().any(|r| matches!(r, Err(ApiError::ExistingFriendship))));

        assert_eq!(list_friendships(&db, a).unwrap().len(), 1);
    }
}
