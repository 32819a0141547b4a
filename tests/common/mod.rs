//! Shared fixtures for integration tests.

use asset_store::{
    client::orchestrator::sha256_hex,
    clock::{Clock, FixedClock},
    db::{AdminDb, Database, OwnerDb},
    models::{
        Asset,
        api::{CreateUploadRequest, CreateUploadResponse, FinalizeRequest},
    },
    services::{
        AssetService,
        hashing::{HashReport, HashRequest, HashingError, HashingService, LocalHashingService},
        identity::{IdentityProvider, SqliteIdentity},
        object_store::{LocalObjectStore, ObjectStore, StoreError, StoreResult},
    },
    state::AppState,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};
use tempfile::TempDir;
use uuid::Uuid;

pub const PUBLIC_URL: &str = "http://localhost:3000";

/// Hashes through the real local service unless told to fail.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct StubHasher {
    inner: LocalHashingService,
    failure: Mutex<Option<String>>,
    gate: Mutex<Option<Arc<tokio::sync::Barrier>>>,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubHasher {
    pub fn fail_with(&self, cause: &str) {
        *self.failure.lock().unwrap() = Some(cause.to_string());
    }

    /// Hold every hash call until `parties` calls are in flight.
    pub fn rendezvous(&self, parties: usize) {
        *self.gate.lock().unwrap() = Some(Arc::new(tokio::sync::Barrier::new(parties)));
    }
}

#[async_trait]
impl HashingService for StubHasher {
    async fn hash_object(&self, request: &HashRequest) -> Result<HashReport, HashingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.wait().await;
        }
        if let Some(cause) = self.failure.lock().unwrap().clone() {
            return Err(HashingError::Transport(cause));
        }
        self.inner.hash_object(request).await
    }
}

/// Local store whose removals can be made to fail.
pub struct FlakyStore {
    inner: Arc<LocalObjectStore>,
    pub fail_removals: AtomicBool,
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn create_signed_upload_url(&self, path: &str) -> StoreResult<String> {
        self.inner.create_signed_upload_url(path).await
    }

    async fn create_signed_url(&self, path: &str, ttl: Duration) -> StoreResult<String> {
        self.inner.create_signed_url(path, ttl).await
    }

    async fn remove(&self, paths: &[String]) -> StoreResult<()> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StoreError::Io(std::io::Error::other("object store unavailable")));
        }
        self.inner.remove(paths).await
    }
}

#[derive(Clone, Debug)]
pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

#[allow(dead_code)]
pub struct TestContext {
    pub db: Database,
    pub objects: Arc<LocalObjectStore>,
    pub store: Arc<FlakyStore>,
    pub hasher: Arc<StubHasher>,
    pub identity: Arc<SqliteIdentity>,
    pub clock: Arc<FixedClock>,
    pub service: AssetService,
    pub alice: TestUser,
    pub bob: TestUser,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestContext {
    pub async fn new() -> Self {
        Self::with_public_url(PUBLIC_URL).await
    }

    /// Bind a real listener and serve the app on it. Signed URLs point at
    /// the returned base URL.
    pub async fn serve() -> (Self, String) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let ctx = Self::with_public_url(&base_url).await;
        let app = ctx.app();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (ctx, base_url)
    }

    async fn with_public_url(public_url: &str) -> Self {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let db_url = format!("sqlite://{}", temp_dir.path().join("meta.db").display());
        let db = Database::connect(&db_url).await.expect("Failed to open database");
        db.migrate().await.expect("Failed to migrate");

        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap(),
        ));

        let storage_path = temp_dir.path().join("objects");
        std::fs::create_dir_all(&storage_path).expect("Failed to create storage directory");
        let objects = Arc::new(
            LocalObjectStore::new(&storage_path, public_url, b"test-key".to_vec(), clock.clone())
                .expect("Failed to create object store"),
        );
        let store = Arc::new(FlakyStore {
            inner: objects.clone(),
            fail_removals: AtomicBool::new(false),
        });
        let hasher = Arc::new(StubHasher {
            inner: LocalHashingService::new(objects.clone()),
            failure: Mutex::new(None),
            gate: Mutex::new(None),
            calls: AtomicUsize::new(0),
        });
        let identity = Arc::new(SqliteIdentity::new(db.admin()));

        let service = AssetService::new(
            store.clone(),
            hasher.clone(),
            identity.clone(),
            clock.clone(),
        );

        let alice = Self::register(&identity, "alice@example.com").await;
        let bob = Self::register(&identity, "bob@example.com").await;

        Self {
            db,
            objects,
            store,
            hasher,
            identity,
            clock,
            service,
            alice,
            bob,
            _temp_dir: temp_dir,
        }
    }

    async fn register(identity: &SqliteIdentity, email: &str) -> TestUser {
        let (id, token) = identity.register(email).await.expect("Failed to register user");
        TestUser {
            id,
            email: email.to_string(),
            token,
        }
    }

    pub fn owner(&self, user: &TestUser) -> OwnerDb {
        self.db.scoped(user.id)
    }

    pub fn admin(&self) -> AdminDb {
        self.db.admin()
    }

    pub fn app(&self) -> axum::Router {
        let identity: Arc<dyn IdentityProvider> = self.identity.clone();
        asset_store::app(AppState {
            db: self.db.clone(),
            service: self.service.clone(),
            objects: self.objects.clone(),
            identity,
        })
    }

    /// Issue a ticket. The clock moves one second forward first so that
    /// every asset gets a distinct `created_at`.
    pub async fn ticket(&self, user: &TestUser, filename: &str, size: i64) -> CreateUploadResponse {
        self.clock.advance(chrono::Duration::seconds(1));
        self.service
            .create_upload_url(
                &self.owner(user),
                &CreateUploadRequest {
                    filename: filename.to_string(),
                    mime: "image/png".to_string(),
                    size,
                },
            )
            .await
            .expect("Failed to issue ticket")
    }

    /// Ticket plus stored bytes, not yet finalized.
    pub async fn uploaded(&self, user: &TestUser, filename: &str, data: &[u8]) -> CreateUploadResponse {
        let ticket = self.ticket(user, filename, data.len() as i64).await;
        self.put_bytes(&ticket.storage_path, data).await;
        ticket
    }

    pub async fn put_bytes(&self, storage_path: &str, data: &[u8]) {
        let chunk = Bytes::copy_from_slice(data);
        self.objects
            .put_object_stream(storage_path, futures::stream::iter(vec![Ok(chunk)]))
            .await
            .expect("Failed to store object");
    }

    pub async fn finalize(
        &self,
        user: &TestUser,
        asset_id: Uuid,
        digest: &str,
        version: i64,
    ) -> asset_store::errors::AppResult<Asset> {
        self.service
            .finalize_upload(
                &self.owner(user),
                &self.admin(),
                asset_id,
                &FinalizeRequest {
                    client_sha256: digest.to_string(),
                    version,
                },
            )
            .await
    }

    /// A verified asset at version 2.
    pub async fn ready_asset(&self, user: &TestUser, filename: &str, data: &[u8]) -> Asset {
        let ticket = self.uploaded(user, filename, data).await;
        self.finalize(user, ticket.asset_id, &sha256_hex(data), 1)
            .await
            .expect("Failed to finalize")
    }

    pub fn object_exists(&self, storage_path: &str) -> bool {
        self.objects.base_path().join(storage_path).exists()
    }

    pub fn now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }
}
