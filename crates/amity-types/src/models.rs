use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability tag attached to every account. Stored as TEXT in the DB and
/// embedded in token claims; always checked as the enum, never as a raw string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Friendships are created as `Pending` and never transition afterwards;
/// the other variants exist for storage compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FriendshipStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendshipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FriendshipStatus::Pending => "PENDING",
            FriendshipStatus::Accepted => "ACCEPTED",
            FriendshipStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for FriendshipStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(FriendshipStatus::Pending),
            "ACCEPTED" => Ok(FriendshipStatus::Accepted),
            "REJECTED" => Ok(FriendshipStatus::Rejected),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

#[derive(Debug)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

/// Public view of an account. The password hash never leaves the DB layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// An undirected relation between two distinct accounts. `user_a`/`user_b`
/// keep the order the relation was created with; `(x,y)` and `(y,x)` name
/// the same relationship everywhere in the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Friendship {
    pub id: Uuid,
    pub user_a: Uuid,
    pub user_b: Uuid,
    pub status: FriendshipStatus,
    pub created_at: DateTime<Utc>,
}
