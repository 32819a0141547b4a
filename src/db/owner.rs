use super::ASSET_COLUMNS;
use crate::{
    clock::db_timestamp,
    errors::{AppError, AppResult},
    models::{Asset, Share, UploadTicket, UserId},
};
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use uuid::Uuid;

/// Everything needed to create a draft asset and its ticket.
#[derive(Debug, Clone)]
pub struct NewDraft {
    pub asset_id: Uuid,
    pub filename: String,
    pub mime: String,
    pub size: i64,
    pub storage_path: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Database handle bound to a single user.
///
/// Writes only ever touch rows whose `owner_id` is the bound user; reads of
/// assets also see rows shared with that user.
#[derive(Clone)]
pub struct OwnerDb {
    pool: SqlitePool,
    owner_id: UserId,
}

impl OwnerDb {
    pub(super) fn new(pool: SqlitePool, owner_id: UserId) -> Self {
        Self { pool, owner_id }
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    /// Insert a `draft` asset at version 1 together with its upload ticket.
    pub async fn insert_draft(&self, draft: &NewDraft) -> AppResult<(Asset, UploadTicket)> {
        let mut tx = self.pool.begin().await?;
        let created_at = db_timestamp(&draft.created_at);

        let asset = sqlx::query_as::<_, Asset>(&format!(
            "INSERT INTO assets (
                 id, owner_id, filename, mime, size, digest, status, version,
                 storage_path, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, NULL, 'draft', 1, ?, ?, ?)
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(draft.asset_id)
        .bind(self.owner_id)
        .bind(&draft.filename)
        .bind(&draft.mime)
        .bind(draft.size)
        .bind(&draft.storage_path)
        .bind(&created_at)
        .bind(&created_at)
        .fetch_one(&mut *tx)
        .await?;

        let ticket = sqlx::query_as::<_, UploadTicket>(
            "INSERT INTO upload_tickets (
                 asset_id, owner_id, nonce, declared_mime, declared_size,
                 storage_path, expires_at, used
             ) VALUES (?, ?, ?, ?, ?, ?, ?, 0)
             RETURNING asset_id, owner_id, nonce, declared_mime, declared_size,
                       storage_path, expires_at, used",
        )
        .bind(draft.asset_id)
        .bind(self.owner_id)
        .bind(&draft.nonce)
        .bind(&draft.mime)
        .bind(draft.size)
        .bind(&draft.storage_path)
        .bind(db_timestamp(&draft.expires_at))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((asset, ticket))
    }

    pub async fn find_ticket(&self, asset_id: Uuid) -> AppResult<Option<UploadTicket>> {
        Ok(sqlx::query_as::<_, UploadTicket>(
            "SELECT asset_id, owner_id, nonce, declared_mime, declared_size,
                    storage_path, expires_at, used
             FROM upload_tickets WHERE asset_id = ? AND owner_id = ?",
        )
        .bind(asset_id)
        .bind(self.owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    pub async fn mark_ticket_used(&self, asset_id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE upload_tickets SET used = 1 WHERE asset_id = ? AND owner_id = ?")
            .bind(asset_id)
            .bind(self.owner_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn owned_asset(&self, asset_id: Uuid) -> AppResult<Option<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE id = ? AND owner_id = ?"
        ))
        .bind(asset_id)
        .bind(self.owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Asset visible to the bound user: owned, or shared with them.
    pub async fn visible_asset(&self, asset_id: Uuid) -> AppResult<Option<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets
             WHERE id = ?
               AND (owner_id = ?
                    OR EXISTS (SELECT 1 FROM asset_shares s
                               WHERE s.asset_id = assets.id AND s.target_user_id = ?))"
        ))
        .bind(asset_id)
        .bind(self.owner_id)
        .bind(self.owner_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Visible asset plus whether the bound user may download it.
    pub async fn download_access(&self, asset_id: Uuid) -> AppResult<Option<(Asset, bool)>> {
        let Some(asset) = self.visible_asset(asset_id).await? else {
            return Ok(None);
        };
        if asset.owner_id == self.owner_id {
            return Ok(Some((asset, true)));
        }
        let can_download: Option<bool> = sqlx::query_scalar(
            "SELECT can_download FROM asset_shares WHERE asset_id = ? AND target_user_id = ?",
        )
        .bind(asset_id)
        .bind(self.owner_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(Some((asset, can_download.unwrap_or(false))))
    }

    /// `draft -> ready`, conditioned on the expected version.
    ///
    /// Returns `None` when no row matched (stale version, or the asset is no
    /// longer a draft).
    pub async fn commit_ready(
        &self,
        asset_id: Uuid,
        digest: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets
             SET digest = ?, status = 'ready', version = version + 1, updated_at = ?
             WHERE id = ? AND owner_id = ? AND version = ? AND status = 'draft'
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(digest)
        .bind(db_timestamp(&now))
        .bind(asset_id)
        .bind(self.owner_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// `draft -> corrupt`. Leaves `ready` and `corrupt` rows untouched.
    pub async fn mark_corrupt(&self, asset_id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE assets SET status = 'corrupt', updated_at = ?
             WHERE id = ? AND owner_id = ? AND status = 'draft'",
        )
        .bind(db_timestamp(&now))
        .bind(asset_id)
        .bind(self.owner_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn rename(
        &self,
        asset_id: Uuid,
        filename: &str,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Asset>> {
        Ok(sqlx::query_as::<_, Asset>(&format!(
            "UPDATE assets
             SET filename = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND owner_id = ? AND version = ?
             RETURNING {ASSET_COLUMNS}"
        ))
        .bind(filename)
        .bind(db_timestamp(&now))
        .bind(asset_id)
        .bind(self.owner_id)
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Upsert a share and bump the asset version in one transaction.
    pub async fn share(
        &self,
        asset_id: Uuid,
        target: UserId,
        can_download: bool,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Asset>> {
        let mut tx = self.pool.begin().await?;
        let Some(asset) = bump_version(&mut tx, asset_id, self.owner_id, expected_version, now).await?
        else {
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO asset_shares (asset_id, target_user_id, can_download, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(asset_id, target_user_id) DO UPDATE SET
                 can_download = excluded.can_download",
        )
        .bind(asset_id)
        .bind(target)
        .bind(can_download)
        .bind(db_timestamp(&now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(asset))
    }

    /// Remove a share and bump the asset version in one transaction.
    ///
    /// Fails with `NotFound` (and leaves the version alone) when no such
    /// share exists.
    pub async fn revoke(
        &self,
        asset_id: Uuid,
        target: UserId,
        expected_version: i64,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Asset>> {
        let mut tx = self.pool.begin().await?;
        let Some(asset) = bump_version(&mut tx, asset_id, self.owner_id, expected_version, now).await?
        else {
            return Ok(None);
        };

        let removed = sqlx::query(
            "DELETE FROM asset_shares WHERE asset_id = ? AND target_user_id = ?",
        )
        .bind(asset_id)
        .bind(target)
        .execute(&mut *tx)
        .await?;

        if removed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::not_found("no share for that user on this asset"));
        }

        tx.commit().await?;
        Ok(Some(asset))
    }

    /// Conditional delete; tickets and shares cascade.
    pub async fn delete(&self, asset_id: Uuid, expected_version: i64) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM assets WHERE id = ? AND owner_id = ? AND version = ?")
            .bind(asset_id)
            .bind(self.owner_id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Owned assets, newest first.
    ///
    /// `before` is an exclusive upper bound on `created_at` (already in
    /// database timestamp form); `filter` is a case-insensitive substring
    /// match on the filename. Fetches at most `limit` rows.
    pub async fn list(
        &self,
        before: Option<&str>,
        filter: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<Asset>> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {ASSET_COLUMNS} FROM assets WHERE owner_id = "
        ));
        builder.push_bind(self.owner_id);

        if let Some(before) = before {
            builder.push(" AND created_at < ");
            builder.push_bind(before.to_string());
        }

        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            builder.push(" AND filename LIKE ");
            builder.push_bind(format!("%{}%", escape_like(filter)));
            builder.push(" ESCAPE '\\'");
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(limit);

        Ok(builder
            .build_query_as::<Asset>()
            .fetch_all(&self.pool)
            .await?)
    }

    /// Shares on an owned asset.
    pub async fn shares(&self, asset_id: Uuid) -> AppResult<Vec<Share>> {
        Ok(sqlx::query_as::<_, Share>(
            "SELECT s.asset_id, s.target_user_id, s.can_download, s.created_at
             FROM asset_shares s JOIN assets a ON a.id = s.asset_id
             WHERE s.asset_id = ? AND a.owner_id = ?
             ORDER BY s.created_at ASC",
        )
        .bind(asset_id)
        .bind(self.owner_id)
        .fetch_all(&self.pool)
        .await?)
    }
}

async fn bump_version(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    asset_id: Uuid,
    owner_id: UserId,
    expected_version: i64,
    now: DateTime<Utc>,
) -> AppResult<Option<Asset>> {
    Ok(sqlx::query_as::<_, Asset>(&format!(
        "UPDATE assets SET version = version + 1, updated_at = ?
         WHERE id = ? AND owner_id = ? AND version = ?
         RETURNING {ASSET_COLUMNS}"
    ))
    .bind(db_timestamp(&now))
    .bind(asset_id)
    .bind(owner_id)
    .bind(expected_version)
    .fetch_optional(&mut **tx)
    .await?)
}

fn escape_like(raw: &str) -> String {
    raw.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}
