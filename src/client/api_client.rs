//! Client for the `/v1` asset API.

use crate::{
    client::transport::TransferError,
    errors::{ErrorBody, ErrorKind},
    models::{
        Asset,
        api::{CreateUploadRequest, CreateUploadResponse, FinalizeRequest},
    },
};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("API error ({status}): {}", .body.message)]
    Api { status: u16, body: ErrorBody },
    #[error("unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid URL: {0}")]
    Url(String),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cancelled")]
    Cancelled,
    #[error("upload task failed: {0}")]
    Task(String),
}

impl ClientError {
    /// Error kind reported by the server, if this came from the API.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api { body, .. } => Some(body.kind),
            _ => None,
        }
    }

    pub fn is_integrity(&self) -> bool {
        self.kind() == Some(ErrorKind::IntegrityError)
    }
}

/// The two API calls an upload needs.
#[async_trait]
pub trait AssetApi: Send + Sync {
    async fn create_upload_url(
        &self,
        request: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, ClientError>;

    async fn finalize_upload(
        &self,
        asset_id: Uuid,
        request: &FinalizeRequest,
    ) -> Result<Asset, ClientError>;
}

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(base_url).map_err(|e| ClientError::Url(e.to_string()))?,
            token: token.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::Url(e.to_string()))
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<T, ClientError> {
        let response = req.bearer_auth(&self.token).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        if !(200..300).contains(&status) {
            return Err(match serde_json::from_str::<ErrorBody>(&body) {
                Ok(body) => ClientError::Api { status, body },
                Err(_) => ClientError::UnexpectedResponse { status, body },
            });
        }
        serde_json::from_str(&body).map_err(|_| ClientError::UnexpectedResponse { status, body })
    }
}

#[async_trait]
impl AssetApi for ApiClient {
    async fn create_upload_url(
        &self,
        request: &CreateUploadRequest,
    ) -> Result<CreateUploadResponse, ClientError> {
        let url = self.url("/v1/uploads")?;
        self.send_json(self.http.post(url).json(request)).await
    }

    async fn finalize_upload(
        &self,
        asset_id: Uuid,
        request: &FinalizeRequest,
    ) -> Result<Asset, ClientError> {
        let url = self.url(&format!("/v1/assets/{asset_id}/finalize"))?;
        self.send_json(self.http.post(url).json(request)).await
    }
}
