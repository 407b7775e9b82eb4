//! Database row types that map directly to SQLite rows.
//! Kept distinct from the amity-types API models so the DB layer stays independent.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use amity_types::models::{Friendship, FriendshipStatus, Role, User};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

pub struct FriendshipRow {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub status: String,
    pub created_at: String,
}

impl UserRow {
    /// Public view of the row; the password hash stays behind.
    pub fn to_user(&self) -> User {
        User {
            id: parse_uuid(&self.id, "user id"),
            email: self.email.clone(),
            role: self.role.parse().unwrap_or_else(|e| {
                warn!("Corrupt role on user '{}': {}", self.id, e);
                Role::User
            }),
            created_at: parse_timestamp(&self.created_at, &self.id),
        }
    }
}

impl FriendshipRow {
    pub fn to_friendship(&self) -> Friendship {
        Friendship {
            id: parse_uuid(&self.id, "friendship id"),
            user_a: parse_uuid(&self.user_a, "user_a"),
            user_b: parse_uuid(&self.user_b, "user_b"),
            status: self.status.parse().unwrap_or_else(|e| {
                warn!("Corrupt status on friendship '{}': {}", self.id, e);
                FriendshipStatus::Pending
            }),
            created_at: parse_timestamp(&self.created_at, &self.id),
        }
    }
}

fn parse_uuid(value: &str, field: &str) -> Uuid {
    value.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", field, value, e);
        Uuid::default()
    })
}

fn parse_timestamp(value: &str, row_id: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            // Parse as naive UTC and convert.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on row '{}': {}", value, row_id, e);
            DateTime::default()
        })
}
