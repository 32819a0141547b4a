//! Asset upload service: signed direct uploads, server-side digest
//! verification, and version-guarded metadata mutations, plus the client
//! that drives an upload end to end.

pub mod client;
pub mod clock;
pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod validation;

use axum::Router;
use state::AppState;

/// The full HTTP application with state attached.
pub fn app(state: AppState) -> Router {
    routes::routes::routes().with_state(state)
}
