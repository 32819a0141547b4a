//! Opaque cursors for `myAssets`.
//!
//! A cursor is the base64 encoding of the last item's `created_at` in
//! database timestamp form. Clients must treat it as a blind token. Two
//! assets created in the same microsecond share a sort key; the one not on
//! the current page may be skipped.

use crate::{
    clock::db_timestamp,
    errors::{AppError, AppResult},
};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};

pub fn encode_cursor(created_at: &DateTime<Utc>) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(db_timestamp(created_at))
}

/// Decode a cursor back into the database timestamp string it wraps.
pub fn decode_cursor(cursor: &str) -> AppResult<String> {
    let invalid = || AppError::invalid("malformed cursor");
    let bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|_| invalid())?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid())?;
    let parsed = DateTime::parse_from_rfc3339(&raw).map_err(|_| invalid())?;
    Ok(db_timestamp(&parsed.with_timezone(&Utc)))
}
