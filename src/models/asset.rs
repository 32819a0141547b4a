//! An uploaded file and its verification state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Version assigned to a freshly created draft.
pub const INITIAL_VERSION: i64 = 1;

/// Verification state of an asset.
///
/// `draft` moves to exactly one of `ready` or `corrupt` through finalize;
/// both are terminal for that transition.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum AssetStatus {
    Draft,
    Ready,
    Corrupt,
}

/// One logical file owned by exactly one user.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    /// Assigned when the upload ticket is issued.
    pub id: Uuid,

    /// The creating user; never changes.
    pub owner_id: Uuid,

    /// Sanitized display name.
    pub filename: String,

    /// Declared MIME type.
    pub mime: String,

    /// Declared size in bytes.
    pub size: i64,

    /// Lower-case hex SHA-256, set once verification succeeds.
    pub digest: Option<String>,

    pub status: AssetStatus,

    /// Optimistic-concurrency counter, bumped by every successful mutation.
    pub version: i64,

    /// Object store location, derived from owner, date, id and filename.
    pub storage_path: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Asset {
    pub fn is_ready(&self) -> bool {
        self.status == AssetStatus::Ready
    }
}
