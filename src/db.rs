// src/db.rs
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS polls (
        id BLOB PRIMARY KEY,
        name TEXT NOT NULL,
        invite_code TEXT NOT NULL UNIQUE,
        created_by BLOB NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS polls_members (
        poll_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        joined_at TEXT NOT NULL,
        UNIQUE (poll_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS poll_options (
        id BLOB PRIMARY KEY,
        poll_id BLOB NOT NULL,
        restaurant_id TEXT NOT NULL,
        name TEXT NOT NULL,
        image_url TEXT,
        menu_url TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS poll_votes (
        id BLOB PRIMARY KEY,
        poll_id BLOB NOT NULL,
        option_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        created_at TEXT NOT NULL,
        UNIQUE (poll_id, option_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS head2head_matches (
        id BLOB PRIMARY KEY,
        inviter_id BLOB NOT NULL,
        invitee_id BLOB NOT NULL,
        status TEXT NOT NULL,
        categories TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS head2head_swipes (
        id BLOB PRIMARY KEY,
        match_id BLOB NOT NULL,
        user_id BLOB NOT NULL,
        restaurant_id TEXT NOT NULL,
        restaurant_name TEXT NOT NULL,
        liked BOOLEAN NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id BLOB PRIMARY KEY,
        user_id BLOB NOT NULL,
        message TEXT NOT NULL,
        read BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_poll_votes_option ON poll_votes (option_id)",
    "CREATE INDEX IF NOT EXISTS idx_swipes_match ON head2head_swipes (match_id, liked)",
];

/// Shared handle to the relational store. Cheap to clone; every component
/// receives its own clone at construction.
#[derive(Clone, Debug)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private, empty database living as long as the returned handle.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        // Every connection to `:memory:` is a separate database, so the pool
        // must hold exactly one connection and never recycle it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        info!("schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}
