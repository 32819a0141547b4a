//! Database access split into two capability handles.
//!
//! [`OwnerDb`] is bound to one authenticated user and every statement it runs
//! is filtered on that user's ownership (reads also admit rows shared with
//! them). [`AdminDb`] is unrestricted and only used for ownership/version
//! prechecks, identity lookups, and operator tasks. Both are minted at the
//! request edge and passed explicitly into every service call.

mod admin;
mod owner;

pub use admin::AdminDb;
pub use owner::{NewDraft, OwnerDb};

use crate::models::UserId;
use anyhow::{Context, Result};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{str::FromStr, time::Duration};

/// Schema, applied statement by statement.
const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

/// Column list shared by every query that materializes an [`crate::models::Asset`].
pub(crate) const ASSET_COLUMNS: &str = "id, owner_id, filename, mime, size, digest, status, \
     version, storage_path, created_at, updated_at";

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the SQLite database at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("parsing database URL `{url}`"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("connecting to `{url}`"))?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        let statements = SCHEMA
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            tracing::debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .with_context(|| format!("migration statement failed: {stmt}"))?;
        }
        Ok(())
    }

    /// Handle restricted to rows owned by (or shared with) `user`.
    pub fn scoped(&self, user: UserId) -> OwnerDb {
        OwnerDb::new(self.pool.clone(), user)
    }

    /// Unrestricted handle.
    pub fn admin(&self) -> AdminDb {
        AdminDb::new(self.pool.clone())
    }

    /// Liveness check used by the readiness probe.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let one: i64 = sqlx::query_scalar("SELECT 1").fetch_one(&self.pool).await?;
        if one == 1 {
            Ok(())
        } else {
            Err(sqlx::Error::Protocol(format!("unexpected result: {one}")))
        }
    }
}
