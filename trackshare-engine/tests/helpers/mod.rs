//! Shared test harness: in-memory collaborators, database seeding, request helpers
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response};
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Barrier;

use trackshare_common::config::EngineConfig;
use trackshare_common::db::init_database;
use trackshare_common::time::to_millis;
use trackshare_common::{StoredObject, Tier};
use trackshare_engine::services::billing_event::SubscriptionObject;
use trackshare_engine::services::event_verifier::sign_payload;
use trackshare_engine::services::{
    BillingProvider, DeletionReport, NewCustomer, Notifier, NotifyError, ObjectStore,
    ProviderError, StorageError, SIGNATURE_HEADER,
};
use trackshare_engine::{AppState, Collaborators};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const CRON_SECRET: &str = "cron-test-secret";
pub const PUBLIC_URL_PREFIX: &str = "https://cdn.test/storage/v1/object/public";
pub const BUCKET: &str = "tracks";

// ---------------------------------------------------------------------------
// Billing provider
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBillingProvider {
    subscriptions: Mutex<HashMap<String, SubscriptionObject>>,
    created: Mutex<Vec<NewCustomer>>,
    idempotency_keys: Mutex<Vec<String>>,
    customer_seq: AtomicUsize,
    fetches: AtomicUsize,
    fail_fetch: Mutex<bool>,
    fetch_delay: Mutex<Option<Duration>>,
    /// Hold every create_customer call until this many are in flight
    create_barrier: Mutex<Option<Arc<Barrier>>>,
}

impl FakeBillingProvider {
    pub fn put_subscription(&self, id: &str, status: &str, user_id: Option<&str>) {
        let mut metadata = HashMap::new();
        if let Some(user_id) = user_id {
            metadata.insert("userId".to_string(), user_id.to_string());
        }
        self.subscriptions.lock().unwrap().insert(
            id.to_string(),
            SubscriptionObject {
                id: id.to_string(),
                status: Some(status.to_string()),
                metadata,
            },
        );
    }

    pub fn fail_fetches(&self) {
        *self.fail_fetch.lock().unwrap() = true;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn hold_creates_until(&self, callers: usize) {
        *self.create_barrier.lock().unwrap() = Some(Arc::new(Barrier::new(callers)));
    }

    pub fn created(&self) -> Vec<NewCustomer> {
        self.created.lock().unwrap().clone()
    }

    pub fn idempotency_keys(&self) -> Vec<String> {
        self.idempotency_keys.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BillingProvider for FakeBillingProvider {
    async fn create_customer(&self, customer: &NewCustomer) -> Result<String, ProviderError> {
        let barrier = self.create_barrier.lock().unwrap().clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }

        let n = self.customer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.created.lock().unwrap().push(customer.clone());
        self.idempotency_keys
            .lock()
            .unwrap()
            .push(customer.idempotency_key());
        Ok(format!("cus_{}", n))
    }

    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionObject, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.fail_fetch.lock().unwrap() {
            return Err(ProviderError::Api {
                status: 500,
                message: "provider unavailable".to_string(),
            });
        }
        self.subscriptions
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("subscription {}", subscription_id)))
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeObjectStore {
    calls: Mutex<Vec<Vec<String>>>,
    fail_all: Mutex<bool>,
    fail_paths: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeObjectStore {
    pub fn fail_all(&self) {
        *self.fail_all.lock().unwrap() = true;
    }

    pub fn fail_path(&self, path: &str) {
        self.fail_paths.lock().unwrap().insert(path.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Every path ever requested, in call order
    pub fn requested_paths(&self) -> Vec<String> {
        self.calls().into_iter().flatten().collect()
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn delete_objects(&self, paths: &[String]) -> Result<DeletionReport, StorageError> {
        self.calls.lock().unwrap().push(paths.to_vec());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail_all.lock().unwrap() {
            return Err(StorageError::Api {
                status: 503,
                message: "storage offline".to_string(),
            });
        }

        let fail_paths = self.fail_paths.lock().unwrap().clone();
        let (failed, deleted): (Vec<String>, Vec<String>) =
            paths.iter().cloned().partition(|p| fail_paths.contains(p));
        Ok(DeletionReport { deleted, failed })
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail_for: Mutex<HashSet<String>>,
}

impl FakeNotifier {
    pub fn fail_for(&self, contact: &str) {
        self.fail_for.lock().unwrap().insert(contact.to_string());
    }

    /// (contact, track title) pairs delivered successfully
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn send_expiration_notice(
        &self,
        contact: &str,
        track_title: &str,
    ) -> Result<(), NotifyError> {
        if self.fail_for.lock().unwrap().contains(contact) {
            return Err(NotifyError::Rejected(500));
        }
        self.sent
            .lock()
            .unwrap()
            .push((contact.to_string(), track_title.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

pub struct TestEnv {
    _dir: TempDir,
    pub pool: SqlitePool,
    pub state: AppState,
    pub billing: Arc<FakeBillingProvider>,
    pub store: Arc<FakeObjectStore>,
    pub notifier: Arc<FakeNotifier>,
}

impl TestEnv {
    pub fn router(&self) -> axum::Router {
        trackshare_engine::build_router(self.state.clone())
    }
}

pub fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.billing.webhook_secret = WEBHOOK_SECRET.to_string();
    config.sweep.cron_secret = CRON_SECRET.to_string();
    config.storage.public_url_prefix = PUBLIC_URL_PREFIX.to_string();
    config.storage.bucket = BUCKET.to_string();
    config
}

pub async fn setup() -> TestEnv {
    setup_with(|_| {}).await
}

pub async fn setup_with(customize: impl FnOnce(&mut EngineConfig)) -> TestEnv {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("engine.db")).await.unwrap();

    let mut config = test_config();
    customize(&mut config);
    config.validate().unwrap();

    let billing = Arc::new(FakeBillingProvider::default());
    let store = Arc::new(FakeObjectStore::default());
    let notifier = Arc::new(FakeNotifier::default());

    let state = AppState::new(
        pool.clone(),
        &config,
        Collaborators {
            billing: billing.clone(),
            store: store.clone(),
            notifier: notifier.clone(),
        },
    )
    .unwrap();

    TestEnv {
        _dir: dir,
        pool,
        state,
        billing,
        store,
        notifier,
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

pub async fn seed_account(pool: &SqlitePool, id: &str, email: Option<&str>, tier: Tier) {
    sqlx::query("INSERT INTO accounts (id, email, display_name, tier) VALUES (?, ?, ?, ?)")
        .bind(id)
        .bind(email)
        .bind(format!("User {}", id))
        .bind(tier.as_str())
        .execute(pool)
        .await
        .unwrap();
}

/// Public URL for an object path in the test bucket
pub fn object_url(path: &str) -> String {
    format!("{}/{}/{}", PUBLIC_URL_PREFIX, BUCKET, path)
}

/// Insert a track whose audio lives at `url`
pub async fn seed_track_with_url(
    pool: &SqlitePool,
    track_id: &str,
    owner_id: &str,
    created_at: DateTime<Utc>,
    url: &str,
) {
    let object = StoredObject {
        id: format!("obj-{}", track_id),
        url: url.to_string(),
        content_type: "audio/mpeg".to_string(),
        byte_size: 1024,
    };
    sqlx::query("INSERT INTO stored_objects (id, url, content_type, byte_size) VALUES (?, ?, ?, ?)")
        .bind(&object.id)
        .bind(&object.url)
        .bind(&object.content_type)
        .bind(object.byte_size)
        .execute(pool)
        .await
        .unwrap();

    sqlx::query(
        "INSERT INTO tracks (id, owner_id, title, created_at, is_public, object_id) VALUES (?, ?, ?, ?, 1, ?)",
    )
    .bind(track_id)
    .bind(owner_id)
    .bind(format!("Song {}", track_id))
    .bind(to_millis(created_at))
    .bind(&object.id)
    .execute(pool)
    .await
    .unwrap();
}

/// Insert a track stored at `<owner>/<track>.mp3` in the test bucket
pub async fn seed_track(pool: &SqlitePool, track_id: &str, owner_id: &str, created_at: DateTime<Utc>) {
    let url = object_url(&format!("{}/{}.mp3", owner_id, track_id));
    seed_track_with_url(pool, track_id, owner_id, created_at, &url).await;
}

pub async fn is_archived(pool: &SqlitePool, track_id: &str) -> bool {
    trackshare_engine::db::tracks::load_track(pool, track_id)
        .await
        .unwrap()
        .map(|t| t.archived)
        .unwrap_or(false)
}

pub async fn ledger_count(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM processed_events")
        .fetch_one(pool)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

pub fn event_body(id: &str, kind: &str, object: Value) -> String {
    serde_json::json!({
        "id": id,
        "type": kind,
        "created": Utc::now().timestamp(),
        "data": { "object": object }
    })
    .to_string()
}

pub fn signed_webhook(body: &str) -> Request<Body> {
    let signature = sign_payload(WEBHOOK_SECRET, Utc::now().timestamp(), body.as_bytes());
    Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn unsigned_webhook(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhooks/billing")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", CRON_SECRET))
        .body(Body::empty())
        .unwrap()
}

pub fn unauthed(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
