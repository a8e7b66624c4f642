//! Database module: models, schema and typed queries for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `users.rs` / `sessions.rs` / `notes.rs`: query methods grouped by entity
//!
//! All access goes through [`Db`], a cheap-to-clone pool wrapper. Every
//! operation is a direct awaited query; uniqueness races (email, username,
//! provider pair) are left to SQLite's constraints and surface as
//! [`QuillError::Database`](crate::error::QuillError).

pub mod models;
pub mod schema;

mod notes;
mod sessions;
mod users;

pub use models::{
    DbConnection, DbImageBlob, DbImageMeta, DbNote, DbNoteSummary, DbSession, DbUser,
    DbVerification,
};
pub use notes::NoteImageChange;
pub use schema::SQLITE_INIT;

use crate::error::QuillError;
use chrono::Utc;
use sqlx::SqlitePool;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use std::{str::FromStr, time::Duration};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Open (creating if missing) the SQLite database, apply the schema and
    /// seed the authorization tables.
    pub async fn connect(database_url: &str) -> Result<Self, QuillError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;

        apply_schema(&pool).await?;
        seed_authorization(&pool).await?;

        info!("database initialized");
        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) fn new_id() -> String {
        Uuid::new_v4().to_string()
    }
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), QuillError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}

const ACTIONS: [&str; 4] = ["create", "read", "update", "delete"];
const ENTITIES: [&str; 2] = ["user", "note"];
const ACCESSES: [&str; 2] = ["own", "any"];

/// Seed the permission matrix and the `user` / `admin` roles on first start.
/// `user` gets every `own` permission, `admin` every `any` permission.
async fn seed_authorization(pool: &SqlitePool) -> Result<(), QuillError> {
    let roles: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role")
        .fetch_one(pool)
        .await?;
    if roles > 0 {
        return Ok(());
    }

    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let mut own_ids = Vec::new();
    let mut any_ids = Vec::new();
    for entity in ENTITIES {
        for action in ACTIONS {
            for access in ACCESSES {
                let id = Db::new_id();
                sqlx::query(
                    r#"
                INSERT INTO permission (id, action, entity, access, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
                )
                .bind(&id)
                .bind(action)
                .bind(entity)
                .bind(access)
                .bind(now)
                .bind(now)
                .execute(&mut *tx)
                .await?;

                match access {
                    "own" => own_ids.push(id),
                    _ => any_ids.push(id),
                }
            }
        }
    }

    for (role, permission_ids) in [("user", &own_ids), ("admin", &any_ids)] {
        let role_id = Db::new_id();
        sqlx::query(
            "INSERT INTO role (id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(&role_id)
        .bind(role)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for permission_id in permission_ids {
            sqlx::query("INSERT INTO role_permission (role_id, permission_id) VALUES (?, ?)")
                .bind(&role_id)
                .bind(permission_id)
                .execute(&mut *tx)
                .await?;
        }
    }

    tx.commit().await?;
    info!("seeded roles and permissions");
    Ok(())
}
