//! src/services/object_store.rs
//!
//! Object store seam plus a local-disk implementation. Payloads live under
//! `base_path/{storage_path}`; clients reach them only through HMAC-signed,
//! time-limited URLs served by `handlers::object_handlers`.

use crate::{clock::Clock, models::TICKET_TTL_SECS, validation::MAX_FILE_SIZE};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use hmac::{Hmac, Mac};
use reqwest::Url;
use sha2::Sha256;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MAX_OBJECT_PATH_LEN: usize = 1024;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object `{0}` already exists")]
    AlreadyExists(String),
    #[error("invalid object path")]
    InvalidPath,
    #[error("object exceeds {0} bytes")]
    TooLarge(i64),
    #[error("signature invalid or expired")]
    BadSignature,
    #[error("invalid URL: {0}")]
    Url(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Operations the asset service needs from an object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Single-use PUT target for `path`.
    async fn create_signed_upload_url(&self, path: &str) -> StoreResult<String>;

    /// Time-limited GET target for `path`.
    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String>;

    /// Remove objects. Missing objects are not an error.
    async fn remove(&self, paths: &[String]) -> StoreResult<()>;
}

/// HTTP method a signature is bound to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignedMethod {
    Put,
    Get,
}

impl SignedMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Put => "PUT",
            Self::Get => "GET",
        }
    }
}

/// Object store backed by the local filesystem.
#[derive(Clone)]
pub struct LocalObjectStore {
    base_path: PathBuf,
    public_url: Url,
    signing_key: Arc<Vec<u8>>,
    clock: Arc<dyn Clock>,
}

impl LocalObjectStore {
    /// Create a store rooted at `base_path` whose signed URLs point at `public_url`.
    pub fn new(
        base_path: impl Into<PathBuf>,
        public_url: &str,
        signing_key: impl Into<Vec<u8>>,
        clock: Arc<dyn Clock>,
    ) -> StoreResult<Self> {
        let public_url = Url::parse(public_url).map_err(|e| StoreError::Url(e.to_string()))?;
        if public_url.cannot_be_a_base() {
            return Err(StoreError::Url(format!("{public_url} cannot be a base URL")));
        }
        Ok(Self {
            base_path: base_path.into(),
            public_url,
            signing_key: Arc::new(signing_key.into()),
            clock,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Reject paths that could escape `base_path`.
    fn ensure_path_safe(path: &str) -> StoreResult<()> {
        if path.is_empty() || path.len() > MAX_OBJECT_PATH_LEN {
            return Err(StoreError::InvalidPath);
        }
        if path.starts_with('/') || path.contains('\\') || path.contains('\0') {
            return Err(StoreError::InvalidPath);
        }
        if path
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(StoreError::InvalidPath);
        }
        if path.chars().any(char::is_control) {
            return Err(StoreError::InvalidPath);
        }
        Ok(())
    }

    fn object_path(&self, path: &str) -> StoreResult<PathBuf> {
        Self::ensure_path_safe(path)?;
        Ok(self.base_path.join(path))
    }

    fn mac(&self, method: SignedMethod, path: &str, expires: i64) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail.
        let mut mac = match HmacSha256::new_from_slice(&self.signing_key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        };
        mac.update(method.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(path.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac
    }

    /// Build `{public_url}/objects/{path}?expires=..&signature=..`.
    pub fn signed_url(&self, method: SignedMethod, path: &str, expires: i64) -> StoreResult<String> {
        Self::ensure_path_safe(path)?;
        let signature = hex::encode(self.mac(method, path, expires).finalize().into_bytes());

        let mut url = self.public_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::Url("base URL cannot take path segments".into()))?;
            segments.pop_if_empty().push("objects");
            segments.extend(path.split('/'));
        }
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.to_string())
    }

    /// Check a presented signature against `method`, `path` and `expires`.
    pub fn verify(
        &self,
        method: SignedMethod,
        path: &str,
        expires: i64,
        signature: &str,
    ) -> StoreResult<()> {
        if self.clock.now().timestamp() >= expires {
            return Err(StoreError::BadSignature);
        }
        let presented = hex::decode(signature).map_err(|_| StoreError::BadSignature)?;
        self.mac(method, path, expires)
            .verify_slice(&presented)
            .map_err(|_| StoreError::BadSignature)
    }

    /// Stream an upload to disk.
    ///
    /// - Refuses to overwrite: an upload URL is good for one object.
    /// - Writes to a temp file, fsyncs, then links into place.
    /// - Rejects bodies larger than [`MAX_FILE_SIZE`].
    ///
    /// Returns the number of bytes stored.
    pub async fn put_object_stream<S>(&self, path: &str, stream: S) -> StoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.object_path(path)?;
        if fs::try_exists(&file_path).await? {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }

        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));

        let result = self.write_temp(&tmp_path, stream).await;
        let size_bytes = match result {
            Ok(size) => size,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        // hard_link fails if the destination appeared meanwhile.
        let linked = fs::hard_link(&tmp_path, &file_path).await;
        let _ = fs::remove_file(&tmp_path).await;
        match linked {
            Ok(()) => Ok(size_bytes),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(path.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn write_temp<S>(&self, tmp_path: &Path, stream: S) -> StoreResult<i64>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let mut file = File::create(tmp_path).await?;
        let mut size_bytes: i64 = 0;
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size_bytes += chunk.len() as i64;
            if size_bytes > MAX_FILE_SIZE {
                return Err(StoreError::TooLarge(MAX_FILE_SIZE));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(size_bytes)
    }

    /// Open an object for reading, returning the handle and its length.
    pub async fn open_object(&self, path: &str) -> StoreResult<(File, u64)> {
        let file_path = self.object_path(path)?;
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StoreError::NotFound(path.to_string())
            } else {
                StoreError::Io(err)
            }
        })?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    async fn remove_object(&self, path: &str) -> StoreResult<()> {
        let file_path = self.object_path(path)?;
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed object {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("object {} already missing", file_path.display());
            }
            Err(err) => return Err(StoreError::Io(err)),
        }
        if let Some(parent) = file_path.parent() {
            self.prune_empty_dirs(parent).await;
        }
        Ok(())
    }

    /// Remove empty directories from `start` up to (not including) `base_path`.
    async fn prune_empty_dirs(&self, start: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(&self.base_path) && current != self.base_path {
            match fs::remove_dir(&current).await {
                Ok(_) => match current.parent() {
                    Some(parent) => current = parent.to_path_buf(),
                    None => break,
                },
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }

    fn expires_in(&self, ttl: Duration) -> i64 {
        self.clock.now().timestamp() + ttl.as_secs() as i64
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn create_signed_upload_url(&self, path: &str) -> StoreResult<String> {
        let expires = self.expires_in(Duration::from_secs(TICKET_TTL_SECS as u64));
        self.signed_url(SignedMethod::Put, path, expires)
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String> {
        let expires = self.expires_in(ttl);
        self.signed_url(SignedMethod::Get, path, expires)
    }

    async fn remove(&self, paths: &[String]) -> StoreResult<()> {
        for path in paths {
            self.remove_object(path).await?;
        }
        Ok(())
    }
}
