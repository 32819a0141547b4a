//! Drives one file through ticket, transfer and finalize.
//!
//! Each stage is raced against the upload's cancellation token, and every
//! state change is reported to a [`ProgressSink`]. The SHA-256 of the
//! payload is computed on a blocking thread while the bytes are in flight.

use crate::{
    client::{
        api_client::{AssetApi, ClientError},
        progress::{
            DONE_PROGRESS, ProgressSink, TICKET_PROGRESS, UploadProgress, UploadState,
            VERIFYING_PROGRESS, transfer_progress,
        },
        transport::{TransferError, TransferObserver, Transport},
    },
    models::{
        Asset, INITIAL_VERSION,
        api::{CreateUploadRequest, FinalizeRequest},
    },
};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::{
    future::Future,
    path::Path,
    sync::{Arc, Mutex},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// A file held in memory for the lifetime of its upload, so finalize can
/// be retried without re-reading it.
#[derive(Clone, Debug)]
pub struct UploadFile {
    pub filename: String,
    pub mime: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, mime: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            mime: mime.into(),
            data: data.into(),
        }
    }

    /// Read `path` into memory. The MIME type is guessed from the extension
    /// unless given.
    pub async fn from_path(path: &Path, mime: Option<String>) -> Result<Self, ClientError> {
        let data = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = mime.unwrap_or_else(|| guess_mime(path).to_string());
        Ok(Self::new(filename, mime, data))
    }
}

fn guess_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Lower-case hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    api: Arc<dyn AssetApi>,
    transport: Arc<dyn Transport>,
    sink: Arc<dyn ProgressSink>,
}

/// A spawned upload.
pub struct UploadHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<Asset, ClientError>>,
}

impl UploadHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn join(self) -> Result<Asset, ClientError> {
        self.task
            .await
            .map_err(|e| ClientError::Task(e.to_string()))?
    }
}

impl UploadOrchestrator {
    pub fn new(
        api: Arc<dyn AssetApi>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            api,
            transport,
            sink,
        }
    }

    /// Upload `file` on its own task.
    pub fn spawn(&self, file: UploadFile) -> UploadHandle {
        let cancel = CancellationToken::new();
        let this = self.clone();
        let token = cancel.clone();
        let task = tokio::spawn(async move { this.upload(&file, token).await });
        UploadHandle { cancel, task }
    }

    /// Ticket, transfer, finalize. The final state is `Ready`, `Corrupt`
    /// (the server rejected the content) or `Error`.
    pub async fn upload(
        &self,
        file: &UploadFile,
        cancel: CancellationToken,
    ) -> Result<Asset, ClientError> {
        let tracker = Arc::new(Tracker::new(self.sink.clone(), &file.filename));
        let result = self.run_upload(file, &cancel, &tracker).await;
        tracker.finish(&result);
        result
    }

    async fn run_upload(
        &self,
        file: &UploadFile,
        cancel: &CancellationToken,
        tracker: &Arc<Tracker>,
    ) -> Result<Asset, ClientError> {
        tracker.enter(UploadState::RequestingTicket, 0);
        let request = CreateUploadRequest {
            filename: file.filename.clone(),
            mime: file.mime.clone(),
            size: file.data.len() as i64,
        };
        let ticket = cancellable(cancel, self.api.create_upload_url(&request)).await??;
        tracker.set_asset(ticket.asset_id);
        tracker.enter(UploadState::Uploading, TICKET_PROGRESS);

        let digest = {
            let data = file.data.clone();
            tokio::task::spawn_blocking(move || sha256_hex(&data))
        };

        let observer = Arc::new(TransferProgress {
            tracker: tracker.clone(),
            cancel: cancel.clone(),
        });
        let transfer = self
            .transport
            .put(&ticket.upload_url, &file.mime, file.data.clone(), observer);
        match cancellable(cancel, transfer).await? {
            Ok(()) => {}
            // The observer refused to continue because we were cancelled.
            Err(TransferError::Aborted) if cancel.is_cancelled() => {
                return Err(ClientError::Cancelled);
            }
            Err(err) => return Err(err.into()),
        }

        let client_sha256 = cancellable(cancel, digest)
            .await?
            .map_err(|e| ClientError::Task(e.to_string()))?;

        self.finalize(ticket.asset_id, INITIAL_VERSION, client_sha256, cancel, tracker)
            .await
    }

    /// Finalize an already transferred upload again, for example after a
    /// network failure on the first attempt. Never requests a ticket or
    /// transfers bytes.
    pub async fn retry_finalize(
        &self,
        asset_id: Uuid,
        version: i64,
        file: &UploadFile,
        cancel: CancellationToken,
    ) -> Result<Asset, ClientError> {
        let tracker = Arc::new(Tracker::new(self.sink.clone(), &file.filename));
        tracker.set_asset(asset_id);

        let result = self
            .run_retry(asset_id, version, file, &cancel, &tracker)
            .await;
        tracker.finish(&result);
        result
    }

    async fn run_retry(
        &self,
        asset_id: Uuid,
        version: i64,
        file: &UploadFile,
        cancel: &CancellationToken,
        tracker: &Tracker,
    ) -> Result<Asset, ClientError> {
        let data = file.data.clone();
        let client_sha256 = cancellable(cancel, tokio::task::spawn_blocking(move || sha256_hex(&data)))
            .await?
            .map_err(|e| ClientError::Task(e.to_string()))?;
        self.finalize(asset_id, version, client_sha256, cancel, tracker)
            .await
    }

    async fn finalize(
        &self,
        asset_id: Uuid,
        version: i64,
        client_sha256: String,
        cancel: &CancellationToken,
        tracker: &Tracker,
    ) -> Result<Asset, ClientError> {
        tracker.enter(UploadState::Verifying, VERIFYING_PROGRESS);
        let request = FinalizeRequest {
            client_sha256,
            version,
        };
        completes_first(cancel, self.api.finalize_upload(asset_id, &request)).await?
    }
}

/// Resolve `future` unless `cancel` fires first.
async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, ClientError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        output = future => Ok(output),
    }
}

/// Like `cancellable`, but an already finished `future` wins over a
/// cancellation that arrived at the same time.
async fn completes_first<F: Future>(
    cancel: &CancellationToken,
    future: F,
) -> Result<F::Output, ClientError> {
    tokio::select! {
        biased;
        output = future => Ok(output),
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
    }
}

/// Current progress of one upload, reported on every change.
struct Tracker {
    sink: Arc<dyn ProgressSink>,
    current: Mutex<UploadProgress>,
}

impl Tracker {
    fn new(sink: Arc<dyn ProgressSink>, filename: &str) -> Self {
        Self {
            sink,
            current: Mutex::new(UploadProgress {
                asset_id: None,
                filename: filename.to_string(),
                state: UploadState::RequestingTicket,
                progress: 0,
                error: None,
            }),
        }
    }

    /// Apply `change` and report the result if it returns true.
    fn update(&self, change: impl FnOnce(&mut UploadProgress) -> bool) {
        let snapshot = {
            let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
            if !change(&mut current) {
                return;
            }
            current.clone()
        };
        self.sink.report(&snapshot);
    }

    fn set_asset(&self, asset_id: Uuid) {
        let mut current = self.current.lock().unwrap_or_else(|p| p.into_inner());
        current.asset_id = Some(asset_id);
    }

    fn enter(&self, state: UploadState, progress: u8) {
        self.update(|p| {
            debug!(filename = %p.filename, from = ?p.state, to = ?state, "upload state change");
            p.state = state;
            p.progress = p.progress.max(progress);
            true
        });
    }

    fn transferred(&self, sent: u64, total: u64) {
        let progress = transfer_progress(sent, total);
        self.update(|p| {
            if p.state != UploadState::Uploading || progress <= p.progress {
                return false;
            }
            p.progress = progress;
            true
        });
    }

    fn finish(&self, result: &Result<Asset, ClientError>) {
        self.update(|p| {
            let to = match result {
                Ok(asset) => {
                    p.asset_id = Some(asset.id);
                    p.progress = DONE_PROGRESS;
                    p.error = None;
                    UploadState::Ready
                }
                Err(err) => {
                    p.error = Some(err.to_string());
                    if err.is_integrity() {
                        UploadState::Corrupt
                    } else {
                        UploadState::Error
                    }
                }
            };
            debug!(filename = %p.filename, from = ?p.state, ?to, "upload finished");
            p.state = to;
            true
        });
    }
}

struct TransferProgress {
    tracker: Arc<Tracker>,
    cancel: CancellationToken,
}

impl TransferObserver for TransferProgress {
    fn on_progress(&self, sent: u64, total: u64) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.tracker.transferred(sent, total);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex_is_lowercase() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_guess_mime() {
        assert_eq!(guess_mime(Path::new("a/B.JPG")), "image/jpeg");
        assert_eq!(guess_mime(Path::new("doc.pdf")), "application/pdf");
        assert_eq!(guess_mime(Path::new("noext")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_cancellable_prefers_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = cancellable(&cancel, async { 1 }).await;
        assert!(matches!(out, Err(ClientError::Cancelled)));

        let live = CancellationToken::new();
        assert_eq!(cancellable(&live, async { 2 }).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_completes_first_keeps_finished_result() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(completes_first(&cancel, async { 3 }).await.unwrap(), 3);

        let out = completes_first(&cancel, std::future::pending::<()>()).await;
        assert!(matches!(out, Err(ClientError::Cancelled)));
    }
}
