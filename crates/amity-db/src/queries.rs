use crate::Database;
use crate::models::{FriendshipRow, UserRow};
use anyhow::Result;
use rusqlite::Connection;
use rusqlite::ffi::{SQLITE_CONSTRAINT_FOREIGNKEY, SQLITE_CONSTRAINT_UNIQUE};

/// Outcome of the atomic friendship insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendshipInsert {
    Created,
    /// The unordered pair already exists, in either order.
    DuplicatePair,
    /// One of the parties vanished between the existence check and the insert.
    MissingAccount,
}

impl Database {
    // -- Users --

    /// Returns false when the email is already taken. The UNIQUE constraint
    /// catches the race where two registrations of the same email interleave.
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, email, password, role) VALUES (?1, ?2, ?3, ?4)",
                (id, email, password_hash, role),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_email(conn, email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn user_exists(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// True iff both ids resolve to distinct existing accounts.
    pub fn both_users_exist(&self, id1: &str, id2: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT id) FROM users WHERE id IN (?1, ?2)",
                (id1, id2),
                |row| row.get(0),
            )?;
            Ok(count == 2)
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, password, role, created_at FROM users ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Updates email and/or role, leaving absent fields untouched.
    /// Returns the updated row, or None if the user does not exist.
    pub fn update_user(
        &self,
        id: &str,
        email: Option<&str>,
        role: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let Some(current) = query_user_by_id(conn, id)? else {
                return Ok(None);
            };
            conn.execute(
                "UPDATE users SET email = ?1, role = ?2 WHERE id = ?3",
                (
                    email.unwrap_or(&current.email),
                    role.unwrap_or(&current.role),
                    id,
                ),
            )?;
            query_user_by_id(conn, id)
        })
    }

    /// Deletes the account and every friendship referencing it, in one
    /// transaction. Returns the deleted row and the number of friendships
    /// removed, or None if the user does not exist.
    pub fn delete_user_cascade(&self, id: &str) -> Result<Option<(UserRow, usize)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(row) = query_user_by_id(&tx, id)? else {
                return Ok(None);
            };
            let removed = tx.execute(
                "DELETE FROM friendships WHERE user_a = ?1 OR user_b = ?1",
                [id],
            )?;
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Some((row, removed)))
        })
    }

    // -- Friendships --

    pub fn friendship_exists_ordered(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE user_a = ?1 AND user_b = ?2)",
                (user_a, user_b),
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn friendship_exists_either_order(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.with_conn(|conn| exists_either_order(conn, user_a, user_b))
    }

    pub fn find_friendship_ordered(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<FriendshipRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_a, user_b, status, created_at FROM friendships
                 WHERE user_a = ?1 AND user_b = ?2",
            )?;
            let row = stmt
                .query_row((user_a, user_b), map_friendship_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Check-then-insert for the unordered pair, executed in one lock hold so
    /// concurrent duplicate creates cannot interleave. The unique pair index
    /// backs the duplicate check at the storage boundary; a foreign-key
    /// violation means a party was deleted after the caller's existence check.
    pub fn insert_friendship(
        &self,
        id: &str,
        user_a: &str,
        user_b: &str,
        status: &str,
        created_at: &str,
    ) -> Result<FriendshipInsert> {
        self.with_conn(|conn| {
            if exists_either_order(conn, user_a, user_b)? {
                return Ok(FriendshipInsert::DuplicatePair);
            }
            let inserted = conn.execute(
                "INSERT INTO friendships (id, user_a, user_b, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, user_a, user_b, status, created_at),
            );
            match inserted {
                Ok(_) => Ok(FriendshipInsert::Created),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == SQLITE_CONSTRAINT_UNIQUE =>
                {
                    Ok(FriendshipInsert::DuplicatePair)
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.extended_code == SQLITE_CONSTRAINT_FOREIGNKEY =>
                {
                    Ok(FriendshipInsert::MissingAccount)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    /// Deletes the row stored as (a,b), falling back to (b,a), in one lock
    /// hold. Returns true if a row was removed.
    pub fn delete_friendship(&self, user_a: &str, user_b: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM friendships WHERE user_a = ?1 AND user_b = ?2",
                (user_a, user_b),
            )?;
            if removed > 0 {
                return Ok(true);
            }
            let removed = conn.execute(
                "DELETE FROM friendships WHERE user_a = ?1 AND user_b = ?2",
                (user_b, user_a),
            )?;
            Ok(removed > 0)
        })
    }

    /// Every friendship where the account appears as either party.
    pub fn friendships_for_user(&self, id: &str) -> Result<Vec<FriendshipRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_a, user_b, status, created_at FROM friendships
                 WHERE user_a = ?1 OR user_b = ?1
                 ORDER BY created_at, id",
            )?;
            let rows = stmt
                .query_map([id], map_friendship_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user_by_email(conn: &Connection, email: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, role, created_at FROM users WHERE email = ?1")?;
    let row = stmt.query_row([email], map_user_row).optional()?;
    Ok(row)
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, email, password, role, created_at FROM users WHERE id = ?1")?;
    let row = stmt.query_row([id], map_user_row).optional()?;
    Ok(row)
}

fn exists_either_order(conn: &Connection, user_a: &str, user_b: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM friendships
         WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1))",
        (user_a, user_b),
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn map_user_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        password: row.get(2)?,
        role: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_friendship_row(
    row: &rusqlite::Row<'_>,
) -> std::result::Result<FriendshipRow, rusqlite::Error> {
    Ok(FriendshipRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        status: row.get(3)?,
        created_at: row.get(4)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(ids: &[&str]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for &id in ids {
            db.create_user(id, &format!("{id}@example.com"), "hash", "USER")
                .unwrap();
        }
        db
    }

    #[test]
    fn user_lookup_and_existence() {
        let db = db_with_users(&["a", "b"]);

        assert!(db.user_exists("a").unwrap());
        assert!(!db.user_exists("z").unwrap());

        let row = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(row.id, "a");
        assert_eq!(row.role, "USER");
        assert!(db.get_user_by_email("z@example.com").unwrap().is_none());

        assert!(db.both_users_exist("a", "b").unwrap());
        assert!(!db.both_users_exist("a", "z").unwrap());
        // same id twice is not a distinct pair
        assert!(!db.both_users_exist("a", "a").unwrap());
    }

    #[test]
    fn duplicate_email_reported_not_inserted() {
        let db = db_with_users(&["a"]);
        assert!(!db.create_user("b", "a@example.com", "hash", "USER").unwrap());
        assert!(!db.user_exists("b").unwrap());
    }

    #[test]
    fn insert_friendship_is_unique_per_unordered_pair() {
        let db = db_with_users(&["a", "b"]);

        assert_eq!(
            db.insert_friendship("f1", "a", "b", "PENDING", "2026-01-01T00:00:00Z").unwrap(),
            FriendshipInsert::Created
        );
        // same order
        assert_eq!(
            db.insert_friendship("f2", "a", "b", "PENDING", "2026-01-01T00:00:00Z").unwrap(),
            FriendshipInsert::DuplicatePair
        );
        // swapped order
        assert_eq!(
            db.insert_friendship("f3", "b", "a", "PENDING", "2026-01-01T00:00:00Z").unwrap(),
            FriendshipInsert::DuplicatePair
        );

        assert!(db.friendship_exists_ordered("a", "b").unwrap());
        assert!(!db.friendship_exists_ordered("b", "a").unwrap());
        assert!(db.friendship_exists_either_order("b", "a").unwrap());

        let row = db.find_friendship_ordered("a", "b").unwrap().unwrap();
        assert_eq!(row.id, "f1");
        assert_eq!(row.status, "PENDING");
        assert!(db.find_friendship_ordered("b", "a").unwrap().is_none());
    }

    #[test]
    fn insert_friendship_reports_a_vanished_party() {
        let db = db_with_users(&["a", "b"]);
        db.delete_user_cascade("b").unwrap().unwrap();

        // "b" was valid when the caller checked, gone by insert time
        assert_eq!(
            db.insert_friendship("f1", "a", "b", "PENDING", "2026-01-01T00:00:00Z").unwrap(),
            FriendshipInsert::MissingAccount
        );
    }

    #[test]
    fn delete_friendship_probes_both_orders() {
        let db = db_with_users(&["a", "b"]);
        db.insert_friendship("f1", "a", "b", "PENDING", "2026-01-01T00:00:00Z")
            .unwrap();

        // stored as (a,b), deleted via (b,a)
        assert!(db.delete_friendship("b", "a").unwrap());
        assert!(!db.delete_friendship("a", "b").unwrap());
        assert!(!db.friendship_exists_either_order("a", "b").unwrap());
    }

    #[test]
    fn friendships_for_user_covers_both_columns() {
        let db = db_with_users(&["a", "b", "c"]);
        db.insert_friendship("f1", "a", "b", "PENDING", "2026-01-01T00:00:00Z")
            .unwrap();
        db.insert_friendship("f2", "c", "a", "PENDING", "2026-01-02T00:00:00Z")
            .unwrap();
        db.insert_friendship("f3", "b", "c", "PENDING", "2026-01-03T00:00:00Z")
            .unwrap();

        let rows = db.friendships_for_user("a").unwrap();
        assert_eq!(rows.len(), 2);
        let rows = db.friendships_for_user("b").unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn update_user_leaves_absent_fields_untouched() {
        let db = db_with_users(&["a"]);

        let row = db.update_user("a", None, Some("ADMIN")).unwrap().unwrap();
        assert_eq!(row.email, "a@example.com");
        assert_eq!(row.role, "ADMIN");

        let row = db.update_user("a", Some("new@example.com"), None).unwrap().unwrap();
        assert_eq!(row.email, "new@example.com");
        assert_eq!(row.role, "ADMIN");

        assert!(db.update_user("z", None, None).unwrap().is_none());
    }

    #[test]
    fn delete_user_cascades_to_friendships() {
        let db = db_with_users(&["a", "b", "c"]);
        db.insert_friendship("f1", "a", "b", "PENDING", "2026-01-01T00:00:00Z")
            .unwrap();
        db.insert_friendship("f2", "c", "a", "PENDING", "2026-01-02T00:00:00Z")
            .unwrap();
        db.insert_friendship("f3", "b", "c", "PENDING", "2026-01-03T00:00:00Z")
            .unwrap();

        let (row, removed) = db.delete_user_cascade("a").unwrap().unwrap();
        assert_eq!(row.id, "a");
        assert_eq!(removed, 2);
        assert!(!db.user_exists("a").unwrap());
        assert!(db.friendship_exists_either_order("b", "c").unwrap());
        assert!(db.delete_user_cascade("a").unwrap().is_none());
    }
}
