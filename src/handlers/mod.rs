pub mod asset_handlers;
pub mod auth;
pub mod health_handlers;
pub mod object_handlers;
