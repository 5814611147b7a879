//! In-memory stand-ins for the port traits.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use super::{
    allocator::PortAllocator,
    dns::DnsReconciler,
    error::Error,
    model::{AppEvent, DnsRecord},
    port::{
        DnsProvider, EventSink, HealthProbe, ProbeFailure, PublicAddress, RecordStore,
        RouteReconciler, SourceControl,
    },
    routing::RoutingService,
};

pub async fn wait_until(condition: impl Fn() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within 10s");
}

pub fn routing_service() -> RoutingService {
    let dns = DnsReconciler::new(
        Arc::new(FakeDnsProvider::default()),
        Arc::new(MemoryRecordStore::default()),
        Arc::new(FakeAddress::new("203.0.113.7")),
    );
    RoutingService::new(
        PortAllocator::new(),
        Arc::new(FakeRoutes::default()),
        dns,
        Arc::new(FakeProbe::healthy()),
    )
}

/// Checkouts are plain directories whose `.git/origin` file holds the remote.
#[derive(Default)]
pub struct FakeSourceControl {
    published: Mutex<HashMap<String, Vec<(String, String)>>>,
    clones: Mutex<Vec<(String, Option<String>, PathBuf)>>,
    pulls: Mutex<Vec<PathBuf>>,
    failing_pulls: AtomicBool,
}

impl FakeSourceControl {
    pub fn publish(&self, repository: &str, file: &str, content: &str) {
        self.published
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .push((file.to_string(), content.to_string()));
    }

    pub fn fake_checkout(&self, directory: &Path, origin: &str, files: &[&str]) {
        std::fs::create_dir_all(directory.join(".git")).unwrap();
        std::fs::write(directory.join(".git/origin"), origin).unwrap();
        for file in files {
            std::fs::write(directory.join(file), "").unwrap();
        }
    }

    pub fn clones(&self) -> Vec<(String, Option<String>, PathBuf)> {
        self.clones.lock().unwrap().clone()
    }

    pub fn pulls(&self) -> Vec<PathBuf> {
        self.pulls.lock().unwrap().clone()
    }

    pub fn fail_pulls(&self) {
        self.failing_pulls.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SourceControl for FakeSourceControl {
    async fn clone_repository(
        &self,
        repository: &str,
        branch: Option<&str>,
        directory: &Path,
    ) -> Result<(), Error> {
        let files = self
            .published
            .lock()
            .unwrap()
            .get(repository)
            .cloned()
            .ok_or_else(|| Error::SourceControl(format!("repository {} not found", repository)))?;
        self.fake_checkout(directory, repository, &[]);
        for (file, content) in files {
            std::fs::write(directory.join(file), content)?;
        }
        self.clones.lock().unwrap().push((
            repository.to_string(),
            branch.map(str::to_string),
            directory.to_path_buf(),
        ));
        Ok(())
    }

    async fn pull(&self, directory: &Path) -> Result<(), Error> {
        if self.failing_pulls.load(Ordering::SeqCst) {
            return Err(Error::SourceControl("remote hung up".to_string()));
        }
        self.pulls.lock().unwrap().push(directory.to_path_buf());
        Ok(())
    }

    async fn origin_url(&self, directory: &Path) -> Result<String, Error> {
        std::fs::read_to_string(directory.join(".git/origin"))
            .map(|origin| origin.trim().to_string())
            .map_err(|_| Error::SourceControl("not a git repository".to_string()))
    }
}

#[derive(Default)]
pub struct FakeRoutes {
    routes: Mutex<HashMap<String, String>>,
}

impl FakeRoutes {
    pub fn upstream(&self, identity: &str) -> Option<String> {
        self.routes.lock().unwrap().get(identity).cloned()
    }
}

#[async_trait]
impl RouteReconciler for FakeRoutes {
    async fn reconcile(
        &self,
        identity: &str,
        _hosts: &[String],
        _paths: &[String],
        upstream: &str,
    ) -> Result<String, Error> {
        self.routes
            .lock()
            .unwrap()
            .insert(identity.to_string(), upstream.to_string());
        Ok(upstream.to_string())
    }
}

#[derive(Default)]
pub struct FakeDnsProvider {
    live: Mutex<Vec<DnsRecord>>,
    created: Mutex<Vec<DnsRecord>>,
    removed: Mutex<Vec<DnsRecord>>,
}

impl FakeDnsProvider {
    pub fn live(&self) -> Vec<DnsRecord> {
        self.live.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<DnsRecord> {
        self.created.lock().unwrap().clone()
    }

    pub fn removed(&self) -> Vec<DnsRecord> {
        self.removed.lock().unwrap().clone()
    }

    pub fn writes(&self) -> usize {
        self.created().len() + self.removed().len()
    }
}

#[async_trait]
impl DnsProvider for FakeDnsProvider {
    async fn create_record(
        &self,
        zone: &str,
        name: &str,
        content: &str,
        proxied: bool,
    ) -> Result<DnsRecord, Error> {
        let record = DnsRecord {
            zone_name: zone.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            proxied,
            id: Some(format!("rec-{}", self.created().len() + 1)),
        };
        self.live.lock().unwrap().push(record.clone());
        self.created.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn remove_record(&self, record: &DnsRecord) -> Result<(), Error> {
        self.live.lock().unwrap().retain(|live| live.id != record.id);
        self.removed.lock().unwrap().push(record.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, DnsRecord>>,
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, identity: &str) -> Result<Option<DnsRecord>, Error> {
        Ok(self.records.lock().unwrap().get(identity).cloned())
    }

    async fn save(&self, identity: &str, record: &DnsRecord) -> Result<(), Error> {
        self.records
            .lock()
            .unwrap()
            .insert(identity.to_string(), record.clone());
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<(), Error> {
        self.records.lock().unwrap().remove(identity);
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(String, DnsRecord)>, Error> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .map(|(identity, record)| (identity.clone(), record.clone()))
            .collect())
    }
}

pub struct FakeAddress {
    address: Mutex<String>,
    failures: AtomicUsize,
}

impl FakeAddress {
    pub fn new(address: &str) -> Self {
        Self {
            address: Mutex::new(address.to_string()),
            failures: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, address: &str) {
        *self.address.lock().unwrap() = address.to_string();
    }

    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl PublicAddress for FakeAddress {
    async fn resolve(&self) -> Result<String, Error> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::provider("ip lookup", "connection reset"));
        }
        Ok(self.address.lock().unwrap().clone())
    }
}

pub struct FakeProbe {
    outcome: Result<(), ProbeFailure>,
}

impl FakeProbe {
    pub fn healthy() -> Self {
        Self { outcome: Ok(()) }
    }

    pub fn failing(failure: ProbeFailure) -> Self {
        Self {
            outcome: Err(failure),
        }
    }
}

#[async_trait]
impl HealthProbe for FakeProbe {
    async fn probe(&self, _host: &str, _path: &str) -> Result<(), ProbeFailure> {
        self.outcome.clone()
    }
}

#[derive(Default)]
pub struct RecordingSink {
    delivered: Arc<Mutex<Vec<(String, AppEvent)>>>,
}

impl RecordingSink {
    pub async fn wait_for(&self, count: usize) -> Vec<(String, AppEvent)> {
        wait_until(|| self.delivered.lock().unwrap().len() >= count).await;
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, urls: &[String], event: &AppEvent) {
        let mut delivered = self.delivered.lock().unwrap();
        for url in urls {
            delivered.push((url.clone(), event.clone()));
        }
    }
}
