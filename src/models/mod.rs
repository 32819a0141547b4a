//! Core data models for the asset service.
//!
//! Row types map to SQLite tables via `sqlx::FromRow` and serialize as
//! camelCase JSON via `serde`.

pub mod api;
pub mod asset;
pub mod share;
pub mod ticket;

pub use asset::{Asset, AssetStatus, INITIAL_VERSION};
pub use share::Share;
pub use ticket::{TICKET_TTL_SECS, UploadTicket};

/// Stable identifier of an authenticated user.
pub type UserId = uuid::Uuid;
