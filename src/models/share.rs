//! Access grants from an asset owner to another user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Keyed by `(asset_id, target_user_id)`. Holding a share grants view
/// access; `can_download` additionally allows signed download URLs.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Share {
    pub asset_id: Uuid,
    pub target_user_id: Uuid,
    pub can_download: bool,
    pub created_at: DateTime<Utc>,
}
