//! Server-side digest recomputation.
//!
//! Finalize never trusts the client's digest on its own: it asks a hashing
//! service to hash the stored object and compares the two.

use crate::services::object_store::{LocalObjectStore, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tokio::io::AsyncReadExt;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HashRequest {
    pub path: String,
    pub expected_mime: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct HashReport {
    /// Hex-encoded SHA-256 of the stored object.
    pub sha256: String,
    pub size: u64,
}

#[derive(Debug, Error)]
pub enum HashingError {
    #[error("hashing service unreachable: {0}")]
    Transport(String),
    #[error("hashing service returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("stored object unavailable: {0}")]
    Object(#[from] StoreError),
    #[error("I/O while hashing: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait HashingService: Send + Sync {
    async fn hash_object(&self, request: &HashRequest) -> Result<HashReport, HashingError>;
}

/// Hashes objects straight off the local object store.
#[derive(Clone)]
pub struct LocalHashingService {
    store: Arc<LocalObjectStore>,
}

impl LocalHashingService {
    pub fn new(store: Arc<LocalObjectStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HashingService for LocalHashingService {
    async fn hash_object(&self, request: &HashRequest) -> Result<HashReport, HashingError> {
        let (mut file, _) = self.store.open_object(&request.path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 64 * 1024];
        let mut size: u64 = 0;
        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
            size += read as u64;
        }
        tracing::debug!(path = %request.path, size, "hashed stored object");
        Ok(HashReport {
            sha256: hex::encode(hasher.finalize()),
            size,
        })
    }
}

/// Calls a remote hashing endpoint with administrative credentials.
#[derive(Clone)]
pub struct HttpHashingService {
    http: reqwest::Client,
    endpoint: reqwest::Url,
    admin_key: String,
}

impl HttpHashingService {
    pub fn new(endpoint: &str, admin_key: impl Into<String>) -> anyhow::Result<Self> {
        use anyhow::Context;
        Ok(Self {
            http: reqwest::Client::new(),
            endpoint: reqwest::Url::parse(endpoint).context("invalid hashing service URL")?,
            admin_key: admin_key.into(),
        })
    }
}

#[async_trait]
impl HashingService for HttpHashingService {
    async fn hash_object(&self, request: &HashRequest) -> Result<HashReport, HashingError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .bearer_auth(&self.admin_key)
            .json(request)
            .send()
            .await
            .map_err(|e| HashingError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| HashingError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(HashingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| HashingError::Rejected {
            status: status.as_u16(),
            body: format!("malformed response ({e}): {body}"),
        })
    }
}
