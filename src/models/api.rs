//! Request and response bodies of the HTTP API. Shared with the upload client.

use crate::models::asset::Asset;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Page size used when `first` is omitted.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub filename: String,
    pub mime: String,
    pub size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadResponse {
    pub asset_id: Uuid,
    pub storage_path: String,
    pub upload_url: String,
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeRequest {
    pub client_sha256: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RenameRequest {
    pub filename: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub to_email: String,
    #[serde(default)]
    pub can_download: bool,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct RevokeRequest {
    pub to_email: String,
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteQuery {
    pub version: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DeleteResponse {
    pub deleted: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MyAssetsQuery {
    pub after: Option<String>,
    pub first: Option<u32>,
    pub q: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AssetEdge {
    pub cursor: String,
    pub node: Asset,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub end_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AssetConnection {
    pub edges: Vec<AssetEdge>,
    pub page_info: PageInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}
