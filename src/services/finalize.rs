//! Upload verification: `draft -> ready | corrupt`.
//!
//! Steps, each a possible exit:
//! 1. look up the caller's ticket for the asset
//! 2. a used ticket whose asset is already `ready` replays that asset
//! 3. reject expired tickets
//! 4. mark the ticket used
//! 5. have the hashing service recompute the digest of the stored object
//! 6. compare digests case-insensitively
//! 7. commit `ready` conditioned on the expected version
//!
//! Failures in 5 and 6 move the asset to `corrupt` before the error is
//! returned, so the stored state is right even if the response is lost.

use crate::{
    db::{AdminDb, OwnerDb},
    errors::{AppError, AppResult, IntegrityFailure},
    models::{Asset, AssetStatus, api::FinalizeRequest},
    services::{asset_service::AssetService, guard, hashing::HashRequest},
    validation::validate_digest,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const INVALID_TICKET: &str = "invalid or expired ticket";

impl AssetService {
    #[tracing::instrument(
        skip(self, owner, admin, request),
        fields(%asset_id, owner_id = %owner.owner_id(), version = request.version)
    )]
    pub async fn finalize_upload(
        &self,
        owner: &OwnerDb,
        admin: &AdminDb,
        asset_id: Uuid,
        request: &FinalizeRequest,
    ) -> AppResult<Asset> {
        validate_digest(&request.client_sha256)?;

        let ticket = owner
            .find_ticket(asset_id)
            .await?
            .ok_or_else(|| AppError::invalid(INVALID_TICKET))?;

        if ticket.used {
            let asset = owner
                .owned_asset(asset_id)
                .await?
                .ok_or_else(|| AppError::invalid(INVALID_TICKET))?;
            match asset.status {
                AssetStatus::Ready => {
                    info!("finalize replayed for an already verified asset");
                    return Ok(asset);
                }
                // commit_ready and mark_corrupt only match drafts, so re-running could not move it either.
                AssetStatus::Corrupt => {
                    return Err(AppError::Integrity(IntegrityFailure::AlreadyCorrupt));
                }
                // A previous attempt died before reaching a terminal state.
                // Run the pipeline again; the conditional commit still guards it.
                AssetStatus::Draft => debug!("ticket already used; re-running verification"),
            }
        }

        if ticket.is_expired_at(self.clock.now()) {
            return Err(AppError::invalid("ticket expired"));
        }

        owner.mark_ticket_used(asset_id).await?;

        let hash_request = HashRequest {
            path: ticket.storage_path.clone(),
            expected_mime: ticket.declared_mime.clone(),
        };
        let report = match self.hasher.hash_object(&hash_request).await {
            Ok(report) => report,
            Err(err) => {
                self.record_corrupt(owner, asset_id).await?;
                warn!(error = %err, "hashing service failed; asset marked corrupt");
                return Err(AppError::Integrity(IntegrityFailure::HashingFailed {
                    cause: err.to_string(),
                }));
            }
        };

        if report.size != ticket.declared_size as u64 {
            debug!(
                declared = ticket.declared_size,
                stored = report.size,
                "stored size differs from declared size"
            );
        }

        let client = request.client_sha256.to_ascii_lowercase();
        let server = report.sha256.to_ascii_lowercase();
        if client != server {
            self.record_corrupt(owner, asset_id).await?;
            warn!(%client, %server, "digest mismatch; asset marked corrupt");
            return Err(AppError::Integrity(IntegrityFailure::DigestMismatch {
                client,
                server,
            }));
        }

        match owner
            .commit_ready(asset_id, &server, request.version, self.clock.now())
            .await?
        {
            Some(asset) => {
                info!(version = asset.version, "asset verified and ready");
                Ok(asset)
            }
            None => Err(commit_failure(admin, asset_id, request.version).await),
        }
    }

    async fn record_corrupt(&self, owner: &OwnerDb, asset_id: Uuid) -> AppResult<()> {
        owner.mark_corrupt(asset_id, self.clock.now()).await?;
        Ok(())
    }
}

/// Explain why the conditional `ready` commit matched nothing.
async fn commit_failure(admin: &AdminDb, asset_id: Uuid, expected_version: i64) -> AppError {
    match admin.asset(asset_id).await {
        Ok(Some(asset)) if asset.status == AssetStatus::Corrupt => {
            AppError::Integrity(IntegrityFailure::AlreadyCorrupt)
        }
        Ok(_) => guard::conflict(admin, asset_id, expected_version).await,
        Err(err) => err,
    }
}
