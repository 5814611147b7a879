use std::path::Path;

use async_trait::async_trait;

use super::{
    error::Error,
    model::{AppEvent, DnsRecord, ServiceError},
};

#[async_trait]
pub trait SourceControl: Send + Sync {
    async fn clone_repository(
        &self,
        repository: &str,
        branch: Option<&str>,
        directory: &Path,
    ) -> Result<(), Error>;

    /// Fast-forwards the checkout to the latest commit of its tracked branch.
    async fn pull(&self, directory: &Path) -> Result<(), Error>;

    async fn origin_url(&self, directory: &Path) -> Result<String, Error>;
}

#[async_trait]
pub trait RouteReconciler: Send + Sync {
    /// Replaces the route owned by `identity` so it forwards to `upstream`.
    async fn reconcile(
        &self,
        identity: &str,
        hosts: &[String],
        paths: &[String],
        upstream: &str,
    ) -> Result<String, Error>;
}

#[async_trait]
pub trait DnsProvider: Send + Sync {
    async fn create_record(
        &self,
        zone: &str,
        name: &str,
        content: &str,
        proxied: bool,
    ) -> Result<DnsRecord, Error>;

    /// Removing a record the provider no longer knows about succeeds.
    async fn remove_record(&self, record: &DnsRecord) -> Result<(), Error>;
}

#[async_trait]
pub trait PublicAddress: Send + Sync {
    async fn resolve(&self) -> Result<String, Error>;
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, identity: &str) -> Result<Option<DnsRecord>, Error>;

    async fn save(&self, identity: &str, record: &DnsRecord) -> Result<(), Error>;

    async fn remove(&self, identity: &str) -> Result<(), Error>;

    async fn all(&self) -> Result<Vec<(String, DnsRecord)>, Error>;
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Best-effort delivery; never reports failures to the caller.
    async fn publish(&self, urls: &[String], event: &AppEvent);
}

#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, host: &str, path: &str) -> Result<(), ProbeFailure>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    Dial(String),
    Service(ServiceError),
}
