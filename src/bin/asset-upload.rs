use anyhow::{Context, Result, bail};
use asset_store::client::{
    ApiClient, FaultInjectingTransport, HttpTransport, TracingSink, Transport, UploadFile,
    UploadOrchestrator, transport::DEFAULT_FAULT_PROBABILITY,
};
use clap::Parser;
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;

/// Upload files to an asset-store server and verify them.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload and verify files against asset-store")]
struct Args {
    /// Server base URL
    #[arg(long, env = "ASSET_STORE_SERVER", default_value = "http://127.0.0.1:3000")]
    server: String,

    /// Bearer token (from `asset-store --create-user`)
    #[arg(long, env = "ASSET_STORE_TOKEN", hide_env_values = true)]
    token: String,

    /// Randomly fail transfers to exercise error handling
    #[arg(long)]
    fault_injection: bool,

    /// Fault probability per progress tick when fault injection is on
    #[arg(long, default_value_t = DEFAULT_FAULT_PROBABILITY, requires = "fault_injection")]
    fault_probability: f64,

    /// MIME type for every file instead of guessing from the extension
    #[arg(long)]
    mime: Option<String>,

    /// Files to upload
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let api = ApiClient::new(&args.server, &args.token).context("configuring API client")?;

    let http = HttpTransport::default();
    let transport: Arc<dyn Transport> = if args.fault_injection {
        tracing::info!(probability = args.fault_probability, "fault injection enabled");
        Arc::new(FaultInjectingTransport::new(http, args.fault_probability))
    } else {
        Arc::new(http)
    };
    let orchestrator = UploadOrchestrator::new(Arc::new(api), transport, Arc::new(TracingSink));

    let mut handles = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadFile::from_path(path, args.mime.clone())
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        handles.push((path.clone(), orchestrator.spawn(file)));
    }

    let cancel_all = {
        let tokens: Vec<_> = handles.iter().map(|(_, h)| h.cancellation_token()).collect();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupted; cancelling uploads");
                tokens.iter().for_each(|t| t.cancel());
            }
        })
    };

    let mut failures = 0;
    for (path, handle) in handles {
        match handle.join().await {
            Ok(asset) => println!(
                "{}\t{}\tready\t{}",
                path.display(),
                asset.id,
                asset.digest.as_deref().unwrap_or("")
            ),
            Err(err) => {
                failures += 1;
                eprintln!("{}\tfailed\t{err}", path.display());
            }
        }
    }
    cancel_all.abort();

    if failures > 0 {
        bail!("{failures} of {} uploads failed", args.files.len());
    }
    Ok(())
}
