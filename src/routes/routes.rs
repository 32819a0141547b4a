//! Route table.
//!
//! ## Structure
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`
//!
//! - **Asset API** (bearer-authenticated, JSON)
//!   - `POST   /v1/uploads`: issue an upload ticket
//!   - `GET    /v1/assets`: list own assets (`after`, `first`, `q`)
//!   - `GET    /v1/assets/{id}`: fetch an owned or shared asset
//!   - `PATCH  /v1/assets/{id}`: rename
//!   - `DELETE /v1/assets/{id}?version=N`: delete
//!   - `POST   /v1/assets/{id}/finalize`: verify an upload
//!   - `GET    /v1/assets/{id}/shares`: list shares
//!   - `POST   /v1/assets/{id}/shares`: share with a user
//!   - `POST   /v1/assets/{id}/shares/revoke`: revoke a share
//!   - `GET    /v1/assets/{id}/download`: signed download URL
//!
//! - **Signed object transfer** (authorized by URL signature only)
//!   - `PUT    /objects/{*path}`, `GET /objects/{*path}`
//!
//! The wildcard `*path` carries storage paths like `owner/2026/10/id-file.pdf`.

use crate::{
    handlers::{
        asset_handlers::{
            create_upload, delete_asset, download_url, finalize_upload, get_asset, list_shares,
            my_assets, rename_asset, revoke_share, share_asset,
        },
        health_handlers::{healthz, readyz},
        object_handlers::{get_object, put_object},
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build the router. Callers attach state with `.with_state(..)`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/v1/uploads", post(create_upload))
        .route("/v1/assets", get(my_assets))
        .route(
            "/v1/assets/{id}",
            get(get_asset).patch(rename_asset).delete(delete_asset),
        )
        .route("/v1/assets/{id}/finalize", post(finalize_upload))
        .route("/v1/assets/{id}/shares", get(list_shares).post(share_asset))
        .route("/v1/assets/{id}/shares/revoke", post(revoke_share))
        .route("/v1/assets/{id}/download", get(download_url))
        .route("/objects/{*path}", put(put_object).get(get_object))
}
