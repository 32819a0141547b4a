//! src/services/asset_service.rs
//!
//! Upload ticket issuance, the version-guarded metadata mutations and the
//! read-side queries. Finalize lives in `services::finalize`.
//!
//! Every call takes the database handles minted for the request; the
//! service itself only holds the external collaborators.

use crate::{
    clock::Clock,
    db::{AdminDb, NewDraft, OwnerDb},
    errors::{AppError, AppResult},
    models::{
        Asset, Share, TICKET_TTL_SECS,
        api::{
            AssetConnection, AssetEdge, CreateUploadRequest, CreateUploadResponse,
            DEFAULT_PAGE_SIZE, DownloadUrl, MAX_PAGE_SIZE, MyAssetsQuery, PageInfo,
            RenameRequest, RevokeRequest, ShareRequest,
        },
    },
    services::{
        guard::{conflict, guarded},
        hashing::HashingService,
        identity::{IdentityProvider, generate_token},
        object_store::ObjectStore,
        pagination::{decode_cursor, encode_cursor},
    },
    validation::{sanitize_filename, storage_path_at, validate_file_size, validate_mime_type},
};
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

/// Lifetime of a signed download URL.
pub const DOWNLOAD_URL_TTL_SECS: u64 = 90;

#[derive(Clone)]
pub struct AssetService {
    pub(super) store: Arc<dyn ObjectStore>,
    pub(super) hasher: Arc<dyn HashingService>,
    pub(super) identity: Arc<dyn IdentityProvider>,
    pub(super) clock: Arc<dyn Clock>,
}

impl AssetService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        hasher: Arc<dyn HashingService>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            hasher,
            identity,
            clock,
        }
    }

    /// Issue an upload ticket: a `draft` asset at version 1 and a signed,
    /// single-use upload URL valid for five minutes.
    #[tracing::instrument(skip(self, owner, request), fields(owner_id = %owner.owner_id()))]
    pub async fn create_upload_url(
        &self,
        owner: &OwnerDb,
        request: &CreateUploadRequest,
    ) -> AppResult<CreateUploadResponse> {
        validate_mime_type(&request.mime)?;
        validate_file_size(request.size)?;
        let filename = sanitize_filename(&request.filename)?;

        let asset_id = Uuid::new_v4();
        let now = self.clock.now();
        let storage_path = storage_path_at(owner.owner_id(), asset_id, &filename, now);
        let upload_url = self.store.create_signed_upload_url(&storage_path).await?;

        let draft = NewDraft {
            asset_id,
            filename,
            mime: request.mime.clone(),
            size: request.size,
            storage_path,
            nonce: generate_token(),
            created_at: now,
            expires_at: now + chrono::Duration::seconds(TICKET_TTL_SECS),
        };
        let (asset, ticket) = owner.insert_draft(&draft).await?;

        info!(%asset_id, size = asset.size, mime = %asset.mime, "upload ticket issued");

        Ok(CreateUploadResponse {
            asset_id: asset.id,
            storage_path: asset.storage_path,
            upload_url,
            expires_at: ticket.expires_at,
            nonce: ticket.nonce,
        })
    }

    #[tracing::instrument(skip(self, owner, admin, request), fields(%asset_id, version = request.version))]
    pub async fn rename_asset(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
        request: &RenameRequest,
    ) -> AppResult<Asset> {
        let filename = sanitize_filename(&request.filename)?;
        let expected = request.version;
        let now = self.clock.now();

        guarded(admin, owner.owner_id(), asset_id, expected, |current| async move {
            ensure_ready(&current)?;
            match owner.rename(asset_id, &filename, expected, now).await? {
                Some(asset) => Ok(asset),
                None => Err(conflict(admin, asset_id, expected).await),
            }
        })
        .await
    }

    #[tracing::instrument(skip(self, owner, admin, request), fields(%asset_id, version = request.version))]
    pub async fn share_asset(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
        request: &ShareRequest,
    ) -> AppResult<Asset> {
        let target = self.resolve_target(owner, &request.to_email).await?;
        let expected = request.version;
        let now = self.clock.now();

        let asset = guarded(admin, owner.owner_id(), asset_id, expected, |current| async move {
            ensure_ready(&current)?;
            match owner
                .share(asset_id, target, request.can_download, expected, now)
                .await?
            {
                Some(asset) => Ok(asset),
                None => Err(conflict(admin, asset_id, expected).await),
            }
        })
        .await?;

        info!(%target, can_download = request.can_download, "asset shared");
        Ok(asset)
    }

    #[tracing::instrument(skip(self, owner, admin, request), fields(%asset_id, version = request.version))]
    pub async fn revoke_share(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
        request: &RevokeRequest,
    ) -> AppResult<Asset> {
        let target = self.resolve_target(owner, &request.to_email).await?;
        let expected = request.version;
        let now = self.clock.now();

        let asset = guarded(admin, owner.owner_id(), asset_id, expected, |current| async move {
            ensure_ready(&current)?;
            match owner.revoke(asset_id, target, expected, now).await? {
                Some(asset) => Ok(asset),
                None => Err(conflict(admin, asset_id, expected).await),
            }
        })
        .await?;

        info!(%target, "share revoked");
        Ok(asset)
    }

    /// Delete the metadata row, then the stored object.
    ///
    /// The row goes first: a failed object removal leaves an orphaned
    /// payload (logged), never a row pointing at nothing.
    #[tracing::instrument(skip(self, owner, admin), fields(%asset_id, version = expected))]
    pub async fn delete_asset(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
        expected: i64,
    ) -> AppResult<bool> {
        guarded(admin, owner.owner_id(), asset_id, expected, |current| async move {
            if !owner.delete(asset_id, expected).await? {
                return Err(conflict(admin, asset_id, expected).await);
            }
            if let Err(err) = self.store.remove(&[current.storage_path.clone()]).await {
                warn!(
                    path = %current.storage_path,
                    error = %err,
                    "failed to remove stored object; metadata already deleted"
                );
            }
            info!("asset deleted");
            Ok(true)
        })
        .await
    }

    /// Owned assets, newest first, as a cursor-paginated connection.
    pub async fn my_assets(
        &self,
        owner: &OwnerDb,
        query: &MyAssetsQuery,
    ) -> AppResult<AssetConnection> {
        let first = query
            .first
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE) as usize;
        let before = query.after.as_deref().map(decode_cursor).transpose()?;

        // One extra row tells us whether another page exists.
        let mut rows = owner
            .list(before.as_deref(), query.q.as_deref(), first as i64 + 1)
            .await?;
        let has_next_page = rows.len() > first;
        rows.truncate(first);

        let edges: Vec<AssetEdge> = rows
            .into_iter()
            .map(|node| AssetEdge {
                cursor: encode_cursor(&node.created_at),
                node,
            })
            .collect();
        let end_cursor = edges.last().map(|edge| edge.cursor.clone());

        Ok(AssetConnection {
            edges,
            page_info: PageInfo {
                end_cursor,
                has_next_page,
            },
        })
    }

    /// Signed, short-lived download URL for a `ready` asset.
    ///
    /// Owners always qualify; other users need a share with `can_download`.
    #[tracing::instrument(skip(self, owner), fields(%asset_id, user_id = %owner.owner_id()))]
    pub async fn get_download_url(&self, owner: &OwnerDb, asset_id: Uuid) -> AppResult<DownloadUrl> {
        let (asset, can_download) = owner
            .download_access(asset_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {asset_id}")))?;
        if !can_download {
            return Err(AppError::Forbidden(
                "share does not include download permission".into(),
            ));
        }
        ensure_ready(&asset)?;

        let ttl = Duration::from_secs(DOWNLOAD_URL_TTL_SECS);
        let url = self.store.create_signed_url(&asset.storage_path, ttl).await?;
        Ok(DownloadUrl {
            url,
            expires_at: self.clock.now() + chrono::Duration::seconds(DOWNLOAD_URL_TTL_SECS as i64),
        })
    }

    /// Asset owned by, or shared with, the caller.
    pub async fn get_asset(&self, owner: &OwnerDb, asset_id: Uuid) -> AppResult<Asset> {
        owner
            .visible_asset(asset_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("asset {asset_id}")))
    }

    /// Shares on one of the caller's assets.
    pub async fn list_shares(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
    ) -> AppResult<Vec<Share>> {
        match admin.asset(asset_id).await? {
            None => Err(AppError::not_found(format!("asset {asset_id}"))),
            Some(asset) if asset.owner_id != owner.owner_id() => Err(AppError::Forbidden(
                format!("asset {asset_id} belongs to another user"),
            )),
            Some(_) => owner.shares(asset_id).await,
        }
    }

    async fn resolve_target(&self, owner: &OwnerDb, email: &str) -> AppResult<Uuid> {
        let target = self
            .identity
            .resolve_email(email)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no user with email `{}`", email.trim())))?;
        if target == owner.owner_id() {
            return Err(AppError::invalid("cannot share an asset with yourself"));
        }
        Ok(target)
    }
}

fn ensure_ready(asset: &Asset) -> AppResult<()> {
    if asset.is_ready() {
        Ok(())
    } else {
        Err(AppError::invalid(format!(
            "asset {} is not ready (status {:?})",
            asset.id, asset.status
        )))
    }
}
