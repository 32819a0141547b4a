//! Upload client: requests a ticket, streams the file to the signed URL,
//! and finalizes it, reporting progress along the way.

pub mod api_client;
pub mod orchestrator;
pub mod progress;
pub mod transport;

pub use api_client::{ApiClient, AssetApi, ClientError};
pub use orchestrator::{UploadFile, UploadHandle, UploadOrchestrator};
pub use progress::{FnSink, ProgressSink, TracingSink, UploadProgress, UploadState};
pub use transport::{FaultInjectingTransport, HttpTransport, TransferError, TransferObserver, Transport};
