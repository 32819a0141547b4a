use super::ASSET_COLUMNS;
use crate::{
    clock::db_timestamp,
    errors::AppResult,
    models::{Asset, UserId},
};
use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Unrestricted database handle.
///
/// Reads here bypass ownership filtering, which is what lets the version
/// guard tell "not yours" apart from "does not exist".
#[derive(Clone)]
pub struct AdminDb {
    pool: SqlitePool,
}

impl AdminDb {
    pub(super) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn asset(&self, asset_id: Uuid) -> AppResult<Option<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"
        ))
        .bind(asset_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn current_version(&self, asset_id: Uuid) -> AppResult<Option<i64>> {
        Ok(sqlx::query_scalar("SELECT version FROM assets WHERE id = ?")
            .bind(asset_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn user_by_email(&self, email: &str) -> AppResult<Option<UserId>> {
        Ok(sqlx::query_scalar("SELECT id FROM users WHERE email = ?")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn user_by_token_hash(&self, token_hash: &str) -> AppResult<Option<UserId>> {
        Ok(sqlx::query_scalar("SELECT user_id FROM api_tokens WHERE token_hash = ?")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn create_user(&self, email: &str) -> AppResult<UserId> {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO users (id, email, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(email.trim())
            .bind(db_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn store_token_hash(&self, user_id: UserId, token_hash: &str) -> AppResult<()> {
        sqlx::query("INSERT INTO api_tokens (token_hash, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token_hash)
            .bind(user_id)
            .bind(db_timestamp(&Utc::now()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
