use anyhow::{Context, Result, bail};
use clap::Parser;
use std::env;

/// Centralized server configuration.
/// Combines environment variables and CLI arguments; CLI wins.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    /// Base of every signed object URL handed to clients.
    pub public_url: String,
    pub signing_key: Option<String>,
    /// Remote hashing endpoint; objects are hashed in-process when unset.
    pub hashing_url: Option<String>,
    pub hashing_key: Option<String>,
}

/// What the binary should do after configuration is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Serve,
    Migrate,
    CreateUser(String),
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Asset upload and verification service")]
pub struct Args {
    /// Host to bind to (overrides ASSET_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where uploaded objects are stored (overrides ASSET_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides ASSET_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Externally reachable base URL for signed object URLs (overrides ASSET_STORE_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// HMAC key for signed object URLs (overrides ASSET_STORE_SIGNING_KEY)
    #[arg(long)]
    pub signing_key: Option<String>,

    /// Remote hashing service endpoint (overrides ASSET_STORE_HASHING_URL)
    #[arg(long)]
    pub hashing_url: Option<String>,

    /// Bearer credential for the remote hashing service (overrides ASSET_STORE_HASHING_KEY)
    #[arg(long)]
    pub hashing_key: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,

    /// Register a user, print a bearer token, and exit
    #[arg(long, value_name = "EMAIL", conflicts_with = "migrate")]
    pub create_user: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command to run.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        Self::resolve(Args::parse(), |key| env::var(key).ok())
    }

    /// Merge `args` over values looked up through `env`.
    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<(Self, Command)> {
        let env_port = match env("ASSET_STORE_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing ASSET_STORE_PORT value `{value}`"))?,
            None => 3000,
        };
        let port = args.port.unwrap_or(env_port);

        let cfg = Self {
            host: args
                .host
                .or_else(|| env("ASSET_STORE_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port,
            storage_dir: args
                .storage_dir
                .or_else(|| env("ASSET_STORE_STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .or_else(|| env("ASSET_STORE_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/asset_store.db".into()),
            public_url: args
                .public_url
                .or_else(|| env("ASSET_STORE_PUBLIC_URL"))
                .unwrap_or_else(|| format!("http://127.0.0.1:{port}")),
            signing_key: args.signing_key.or_else(|| env("ASSET_STORE_SIGNING_KEY")),
            hashing_url: args.hashing_url.or_else(|| env("ASSET_STORE_HASHING_URL")),
            hashing_key: args.hashing_key.or_else(|| env("ASSET_STORE_HASHING_KEY")),
        };

        let command = match (args.migrate, args.create_user) {
            (true, _) => Command::Migrate,
            (false, Some(email)) => Command::CreateUser(email),
            (false, None) => Command::Serve,
        };

        Ok((cfg, command))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The URL signing key, which serving cannot do without.
    pub fn require_signing_key(&self) -> Result<&str> {
        match self.signing_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(key),
            _ => bail!("ASSET_STORE_SIGNING_KEY (or --signing-key) must be set to serve"),
        }
    }
}
