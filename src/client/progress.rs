//! Per-file upload state as seen by whoever is watching the upload.

use serde::Serialize;
use uuid::Uuid;

/// Progress reserved for obtaining the upload ticket.
pub const TICKET_PROGRESS: u8 = 5;
/// Progress once every byte has been transferred; verification follows.
pub const VERIFYING_PROGRESS: u8 = 90;
pub const DONE_PROGRESS: u8 = 100;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UploadState {
    RequestingTicket,
    Uploading,
    Verifying,
    Ready,
    Corrupt,
    Error,
}

impl UploadState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Corrupt | Self::Error)
    }
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    /// Known once the ticket has been issued.
    pub asset_id: Option<Uuid>,
    pub filename: String,
    pub state: UploadState,
    /// 0..=100.
    pub progress: u8,
    pub error: Option<String>,
}

/// Receives every state change of an upload.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &UploadProgress);
}

/// Logs state changes through `tracing`.
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn report(&self, p: &UploadProgress) {
        match p.state {
            UploadState::Error | UploadState::Corrupt => tracing::warn!(
                filename = %p.filename,
                state = ?p.state,
                error = p.error.as_deref().unwrap_or(""),
                "upload failed"
            ),
            UploadState::Ready => tracing::info!(
                filename = %p.filename,
                asset_id = ?p.asset_id,
                "upload ready"
            ),
            _ => tracing::debug!(
                filename = %p.filename,
                state = ?p.state,
                progress = p.progress,
                "upload progress"
            ),
        }
    }
}

/// A sink that wraps a closure.
pub struct FnSink<F> {
    callback: F,
}

impl<F> FnSink<F>
where
    F: Fn(&UploadProgress) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressSink for FnSink<F>
where
    F: Fn(&UploadProgress) + Send + Sync,
{
    fn report(&self, progress: &UploadProgress) {
        (self.callback)(progress)
    }
}

/// Map transferred bytes onto the transfer band between ticket and
/// verification.
pub fn transfer_progress(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return VERIFYING_PROGRESS;
    }
    let band = u64::from(VERIFYING_PROGRESS - TICKET_PROGRESS);
    let within = sent.min(total) * band / total;
    TICKET_PROGRESS + within as u8
}
