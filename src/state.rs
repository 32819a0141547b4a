//! Application state shared across handlers.

use crate::{
    db::Database,
    services::{AssetService, identity::IdentityProvider, object_store::LocalObjectStore},
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Mints per-request capability handles; handlers never query it directly.
    pub db: Database,
    pub service: AssetService,
    /// Serves signed object transfers and backs the readiness disk check.
    pub objects: Arc<LocalObjectStore>,
    pub identity: Arc<dyn IdentityProvider>,
}
