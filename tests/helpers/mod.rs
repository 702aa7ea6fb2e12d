//! Test helper utilities for kitchen tests

use async_trait::async_trait;
use letmecook_kitchen::{
    kitchen::{KitchenConfig, KitchenService, KitchenView},
    models::{job::JobId, remote::RemoteRecord},
    services::{
        local_store::FileLocalStore,
        status_source::{SourceError, StatusSource, TransportError},
    },
};
use reqwest::StatusCode;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// In-memory status source whose failures and latency are controlled by the test.
#[derive(Default)]
pub struct ScriptedSource {
    records: Mutex<Vec<RemoteRecord>>,
    list_delay: Mutex<Duration>,
    create_delay: Mutex<Duration>,
    pub fail_list: AtomicBool,
    pub fail_create: AtomicBool,
    pub fail_delete: AtomicBool,
    /// Accept creations but keep them out of listings, like a lagging replica.
    pub hide_created: AtomicBool,
    pub list_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn with_records(records: Vec<RemoteRecord>) -> Arc<Self> {
        let source = Self::default();
        *source.records.lock().unwrap() = records;
        Arc::new(source)
    }

    pub fn set_records(&self, records: Vec<RemoteRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = delay;
    }

    pub fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().unwrap() = delay;
    }

    pub fn contains(&self, id: &JobId) -> bool {
        self.records
            .lock()
            .unwrap()
            .iter()
            .any(|r| r.id.as_deref() == Some(id.as_str()))
    }

    fn unavailable() -> TransportError {
        TransportError::Status(StatusCode::SERVICE_UNAVAILABLE)
    }
}

#[async_trait]
impl StatusSource for ScriptedSource {
    async fn list_jobs(&self) -> Result<Vec<RemoteRecord>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.list_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(SourceError::RemoteUnavailable(Self::unavailable()));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    async fn create_job(&self, record: &RemoteRecord) -> Result<RemoteRecord, SourceError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let id = JobId::new(record.id.clone().unwrap_or_default());
        let delay = *self.create_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(SourceError::UploadFailed {
                id,
                source: Self::unavailable(),
            });
        }
        if !self.hide_created.load(Ordering::SeqCst) {
            self.records.lock().unwrap().push(record.clone());
        }
        Ok(record.clone())
    }

    async fn delete_job(&self, id: &JobId) -> Result<(), SourceError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(SourceError::DeleteFailed {
                id: id.clone(),
                source: Self::unavailable(),
            });
        }
        self.records
            .lock()
            .unwrap()
            .retain(|r| r.id.as_deref() != Some(id.as_str()));
        Ok(())
    }
}

/// Kitchen limits used by the scenario tests; polling only happens on demand.
pub fn test_config() -> KitchenConfig {
    KitchenConfig {
        max_concurrent: 3,
        cook_duration: 3,
        tick_period: Duration::from_secs(1),
        poll_period: Duration::from_secs(3600),
        grace_period: Duration::from_secs(30),
    }
}

/// A running kitchen plus the temporary directory backing its local store.
pub struct TestKitchen {
    pub kitchen: KitchenService,
    pub source: Arc<ScriptedSource>,
    pub store: Arc<FileLocalStore>,
    _dir: TempDir,
}

pub async fn start_kitchen(source: Arc<ScriptedSource>) -> TestKitchen {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    start_kitchen_in(dir, source).await
}

pub async fn start_kitchen_in(dir: TempDir, source: Arc<ScriptedSource>) -> TestKitchen {
    let store = Arc::new(FileLocalStore::new(dir.path().join("jobs.json")));
    let kitchen = KitchenService::start(test_config(), source.clone(), store.clone()).await;
    TestKitchen {
        kitchen,
        source,
        store,
        _dir: dir,
    }
}

/// Wait (in virtual time when the clock is paused) until the view satisfies `predicate`.
pub async fn wait_for<F>(kitchen: &KitchenService, mut predicate: F) -> KitchenView
where
    F: FnMut(&KitchenView) -> bool,
{
    let mut rx = kitchen.subscribe();
    let view = tokio::time::timeout(Duration::from_secs(300), rx.wait_for(|view| predicate(view)))
        .await
        .expect("Timed out waiting for kitchen state")
        .expect("Kitchen stopped while waiting");
    view.clone()
}

/// Give an on-demand poll time to complete.
pub async fn refresh_and_settle(kitchen: &KitchenService) {
    kitchen.refresh();
    tokio::time::sleep(Duration::from_millis(100)).await;
}
