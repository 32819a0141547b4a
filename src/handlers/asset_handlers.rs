//! JSON handlers for the `/v1` asset API.
//!
//! Each handler authenticates the caller, mints the owner-scoped and admin
//! database handles for this request, and hands them to `AssetService`.
//! Extractor rejections are taken as values and turned into `InvalidInput`
//! so malformed requests still get a JSON error body.

use crate::{
    errors::AppError,
    handlers::auth::AuthenticatedUser,
    models::{
        Asset, Share,
        api::{
            AssetConnection, CreateUploadRequest, CreateUploadResponse, DeleteQuery,
            DeleteResponse, DownloadUrl, FinalizeRequest, MyAssetsQuery, RenameRequest,
            RevokeRequest, ShareRequest,
        },
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use uuid::Uuid;

/// `POST /v1/uploads`
pub async fn create_upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    request: Result<Json<CreateUploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateUploadResponse>), AppError> {
    let Json(request) = request?;
    let owner = state.db.scoped(user.user_id);
    let ticket = state.service.create_upload_url(&owner, &request).await?;
    Ok((StatusCode::CREATED, Json(ticket)))
}

/// `POST /v1/assets/{id}/finalize`
pub async fn finalize_upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<Asset>, AppError> {
    let Path(asset_id) = asset_id?;
    let Json(request) = request?;
    let owner = state.db.scoped(user.user_id);
    let asset = state
        .service
        .finalize_upload(&owner, &state.db.admin(), asset_id, &request)
        .await?;
    Ok(Json(asset))
}

/// `GET /v1/assets?after=&first=&q=`
pub async fn my_assets(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    query: Result<Query<MyAssetsQuery>, QueryRejection>,
) -> Result<Json<AssetConnection>, AppError> {
    let Query(query) = query?;
    let owner = state.db.scoped(user.user_id);
    Ok(Json(state.service.my_assets(&owner, &query).await?))
}

/// `GET /v1/assets/{id}`
pub async fn get_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Asset>, AppError> {
    let Path(asset_id) = asset_id?;
    let owner = state.db.scoped(user.user_id);
    Ok(Json(state.service.get_asset(&owner, asset_id).await?))
}

/// `PATCH /v1/assets/{id}`
pub async fn rename_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<RenameRequest>, JsonRejection>,
) -> Result<Json<Asset>, AppError> {
    let Path(asset_id) = asset_id?;
    let Json(request) = request?;
    let owner = state.db.scoped(user.user_id);
    let asset = state
        .service
        .rename_asset(&owner, &state.db.admin(), asset_id, &request)
        .await?;
    Ok(Json(asset))
}

/// `DELETE /v1/assets/{id}?version=N`
pub async fn delete_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<DeleteQuery>, QueryRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Path(asset_id) = asset_id?;
    let Query(query) = query?;
    let owner = state.db.scoped(user.user_id);
    let deleted = state
        .service
        .delete_asset(&owner, &state.db.admin(), asset_id, query.version)
        .await?;
    Ok(Json(DeleteResponse { deleted }))
}

/// `GET /v1/assets/{id}/shares`
pub async fn list_shares(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Vec<Share>>, AppError> {
    let Path(asset_id) = asset_id?;
    let owner = state.db.scoped(user.user_id);
    let shares = state
        .service
        .list_shares(&owner, &state.db.admin(), asset_id)
        .await?;
    Ok(Json(shares))
}

/// `POST /v1/assets/{id}/shares`
pub async fn share_asset(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<ShareRequest>, JsonRejection>,
) -> Result<Json<Asset>, AppError> {
    let Path(asset_id) = asset_id?;
    let Json(request) = request?;
    let owner = state.db.scoped(user.user_id);
    let asset = state
        .service
        .share_asset(&owner, &state.db.admin(), asset_id, &request)
        .await?;
    Ok(Json(asset))
}

/// `POST /v1/assets/{id}/shares/revoke`
pub async fn revoke_share(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
    request: Result<Json<RevokeRequest>, JsonRejection>,
) -> Result<Json<Asset>, AppError> {
    let Path(asset_id) = asset_id?;
    let Json(request) = request?;
    let owner = state.db.scoped(user.user_id);
    let asset = state
        .service
        .revoke_share(&owner, &state.db.admin(), asset_id, &request)
        .await?;
    Ok(Json(asset))
}

/// `GET /v1/assets/{id}/download`
pub async fn download_url(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    asset_id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DownloadUrl>, AppError> {
    let Path(asset_id) = asset_id?;
    let owner = state.db.scoped(user.user_id);
    Ok(Json(state.service.get_download_url(&owner, asset_id).await?))
}
