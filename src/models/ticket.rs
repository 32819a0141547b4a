//! One-time capability binding an asset id to a single upload attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How long an issued ticket stays valid.
pub const TICKET_TTL_SECS: i64 = 300;

#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadTicket {
    pub asset_id: Uuid,
    pub owner_id: Uuid,

    /// Random token issued with the ticket. Not checked by finalize yet.
    pub nonce: String,

    pub declared_mime: String,
    pub declared_size: i64,
    pub storage_path: String,
    pub expires_at: DateTime<Utc>,

    /// Set once finalize has started processing this ticket.
    pub used: bool,
}

impl UploadTicket {
    /// A ticket is expired from the instant `expires_at` is reached.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ticket(expires_at: DateTime<Utc>) -> UploadTicket {
        UploadTicket {
            asset_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            nonce: "n".into(),
            declared_mime: "image/png".into(),
            declared_size: 1,
            storage_path: "p".into(),
            expires_at,
            used: false,
        }
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        let t = ticket(at);
        assert!(!t.is_expired_at(at - Duration::microseconds(1)));
        assert!(t.is_expired_at(at));
        assert!(t.is_expired_at(at + Duration::seconds(1)));
    }
}
