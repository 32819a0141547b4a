use anyhow::{Context, Result};
use asset_store::{
    clock::{Clock, SystemClock},
    config::{AppConfig, Command},
    db::Database,
    services::{
        AssetService,
        hashing::{HashingService, HttpHashingService, LocalHashingService},
        identity::{IdentityProvider, SqliteIdentity},
        object_store::LocalObjectStore,
    },
    state::AppState,
};
use std::{io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;
    tracing::info!(
        addr = %cfg.addr(),
        storage_dir = %cfg.storage_dir,
        database_url = %cfg.database_url,
        public_url = %cfg.public_url,
        remote_hashing = cfg.hashing_url.is_some(),
        "Starting asset-store"
    );

    ensure_sqlite_parent(&cfg.database_url)?;
    let db = Database::connect(&cfg.database_url).await?;
    // The schema is idempotent, so every mode applies it first.
    db.migrate().await?;

    match command {
        Command::Migrate => {
            tracing::info!("Database migration complete.");
            return Ok(());
        }
        Command::CreateUser(email) => {
            let identity = SqliteIdentity::new(db.admin());
            let (user_id, token) = identity
                .register(&email)
                .await
                .with_context(|| format!("registering `{email}`"))?;
            println!("user_id={user_id}");
            println!("token={token}");
            return Ok(());
        }
        Command::Serve => {}
    }

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        std::fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize collaborators ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let objects = Arc::new(
        LocalObjectStore::new(
            &cfg.storage_dir,
            &cfg.public_url,
            cfg.require_signing_key()?.as_bytes().to_vec(),
            clock.clone(),
        )
        .context("configuring object store")?,
    );

    let hasher: Arc<dyn HashingService> = match &cfg.hashing_url {
        Some(url) => {
            let key = cfg
                .hashing_key
                .clone()
                .context("ASSET_STORE_HASHING_KEY is required with a remote hashing service")?;
            tracing::info!(%url, "Using remote hashing service");
            Arc::new(HttpHashingService::new(url, key)?)
        }
        None => Arc::new(LocalHashingService::new(objects.clone())),
    };

    let identity: Arc<dyn IdentityProvider> = Arc::new(SqliteIdentity::new(db.admin()));
    let service = AssetService::new(objects.clone(), hasher, identity.clone(), clock);

    let app = asset_store::app(AppState {
        db,
        service,
        objects,
        identity,
    });

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the directory holding a file-backed SQLite database.
fn ensure_sqlite_parent(database_url: &str) -> Result<()> {
    let db_path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    if db_path.is_empty() || db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }
    Ok(())
}
