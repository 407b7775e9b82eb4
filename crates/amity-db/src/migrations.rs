use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            role        TEXT NOT NULL DEFAULT 'USER',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS friendships (
            id          TEXT PRIMARY KEY,
            user_a      TEXT NOT NULL REFERENCES users(id),
            user_b      TEXT NOT NULL REFERENCES users(id),
            status      TEXT NOT NULL DEFAULT 'PENDING',
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK (user_a <> user_b)
        );

        -- One row per unordered pair, whichever order it was stored in.
        CREATE UNIQUE INDEX IF NOT EXISTS idx_friendships_pair
            ON friendships(min(user_a, user_b), max(user_a, user_b));

        CREATE INDEX IF NOT EXISTS idx_friendships_user_a
            ON friendships(user_a);

        CREATE INDEX IF NOT EXISTS idx_friendships_user_b
            ON friendships(user_b);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
