pub mod asset_service;
pub mod finalize;
pub mod guard;
pub mod hashing;
pub mod identity;
pub mod object_store;
pub mod pagination;

pub use asset_service::AssetService;
