//! Optimistic-concurrency guard for metadata mutations.
//!
//! No mutation is applied unless the caller observed the current version.
//! The precheck here is a separate read; every guarded write must still be
//! conditional on `id` and `version`, and a write that matches zero rows is
//! reported through [`conflict`].

use crate::{
    db::AdminDb,
    errors::{AppError, AppResult},
    models::{Asset, UserId},
};
use std::future::Future;
use uuid::Uuid;

/// Check ownership and version of `asset_id`, then run `operation` with the
/// snapshot that was read.
///
/// Fails with `NotFound` when the asset does not exist, `Forbidden` when it
/// belongs to someone else, and `VersionConflict` when `expected_version` is
/// stale.
pub async fn guarded<T, F, Fut>(
    admin: &AdminDb,
    owner_id: UserId,
    asset_id: Uuid,
    expected_version: i64,
    operation: F,
) -> AppResult<T>
where
    F: FnOnce(Asset) -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let current = admin
        .asset(asset_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("asset {asset_id}")))?;

    if current.owner_id != owner_id {
        return Err(AppError::Forbidden(format!(
            "asset {asset_id} belongs to another user"
        )));
    }

    if current.version != expected_version {
        tracing::debug!(
            %asset_id,
            expected = expected_version,
            actual = current.version,
            "version precheck failed"
        );
        return Err(AppError::VersionConflict {
            expected: expected_version,
            actual: current.version,
        });
    }

    operation(current).await
}

/// Error for a conditional write that matched no row.
///
/// Re-reads the version so the caller learns what it raced against.
pub async fn conflict(admin: &AdminDb, asset_id: Uuid, expected_version: i64) -> AppError {
    match admin.current_version(asset_id).await {
        Ok(Some(actual)) => {
            tracing::debug!(
                %asset_id,
                expected = expected_version,
                actual,
                "conditional write lost a race"
            );
            AppError::VersionConflict {
                expected: expected_version,
                actual,
            }
        }
        Ok(None) => AppError::not_found(format!("asset {asset_id}")),
        Err(err) => err,
    }
}
