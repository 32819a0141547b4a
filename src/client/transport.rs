//! Byte transfer to a signed upload URL.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream};
use rand::Rng;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};
use thiserror::Error;
use tracing::debug;

/// Size of each chunk handed to the HTTP body.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Per-tick fault probability used by `--fault-injection`.
pub const DEFAULT_FAULT_PROBABILITY: f64 = 0.15;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("network error: {0}")]
    Network(String),
    #[error("upload rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("transfer aborted")]
    Aborted,
}

/// Observes a transfer as bytes leave.
pub trait TransferObserver: Send + Sync {
    /// Called with cumulative bytes sent. Returning `false` aborts the
    /// transfer with [`TransferError::Aborted`].
    fn on_progress(&self, sent: u64, total: u64) -> bool;
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// PUT `data` to `url` with the given content type.
    async fn put(
        &self,
        url: &str,
        mime: &str,
        data: Bytes,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<(), TransferError>;
}

/// Streams the payload through `reqwest` in [`CHUNK_SIZE`] pieces, reporting
/// each chunk as the connection pulls it.
#[derive(Clone, Default)]
pub struct HttpTransport {
    http: reqwest::Client,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn put(
        &self,
        url: &str,
        mime: &str,
        data: Bytes,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<(), TransferError> {
        let total = data.len() as u64;
        let chunks: Vec<Bytes> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| data.slice(start..(start + CHUNK_SIZE).min(data.len())))
            .collect();

        let sent = Arc::new(AtomicU64::new(0));
        let aborted = Arc::new(AtomicBool::new(false));
        let body = {
            let aborted = aborted.clone();
            stream::iter(chunks).map(move |chunk| {
                let so_far = sent.fetch_add(chunk.len() as u64, Ordering::SeqCst) + chunk.len() as u64;
                if observer.on_progress(so_far, total) {
                    Ok(chunk)
                } else {
                    aborted.store(true, Ordering::SeqCst);
                    Err(io::Error::other("transfer aborted by observer"))
                }
            })
        };

        let result = self
            .http
            .put(url)
            .header(CONTENT_TYPE, mime)
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(body))
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(_) if aborted.load(Ordering::SeqCst) => return Err(TransferError::Aborted),
            Err(err) => return Err(TransferError::Network(err.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Decorator that fails a transfer at random, once per progress tick with
/// probability `probability`. Used to exercise retry and error paths
/// against a real server.
pub struct FaultInjectingTransport<T> {
    inner: T,
    probability: f64,
}

impl<T: Transport> FaultInjectingTransport<T> {
    /// `probability` is clamped to `0.0..=1.0`.
    pub fn new(inner: T, probability: f64) -> Self {
        let probability = if probability.is_nan() {
            0.0
        } else {
            probability.clamp(0.0, 1.0)
        };
        Self { inner, probability }
    }

    pub fn probability(&self) -> f64 {
        self.probability
    }
}

struct FaultingObserver {
    inner: Arc<dyn TransferObserver>,
    probability: f64,
    injected: AtomicBool,
}

impl TransferObserver for FaultingObserver {
    fn on_progress(&self, sent: u64, total: u64) -> bool {
        if self.probability > 0.0 && rand::rng().random_bool(self.probability) {
            debug!(sent, total, "injecting transfer fault");
            self.injected.store(true, Ordering::SeqCst);
            return false;
        }
        self.inner.on_progress(sent, total)
    }
}

#[async_trait]
impl<T: Transport> Transport for FaultInjectingTransport<T> {
    async fn put(
        &self,
        url: &str,
        mime: &str,
        data: Bytes,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<(), TransferError> {
        let faulting = Arc::new(FaultingObserver {
            inner: observer,
            probability: self.probability,
            injected: AtomicBool::new(false),
        });
        let result = self.inner.put(url, mime, data, faulting.clone()).await;
        match result {
            Err(_) if faulting.injected.load(Ordering::SeqCst) => {
                Err(TransferError::Network("injected fault".into()))
            }
            other => other,
        }
    }
}
