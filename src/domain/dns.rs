use std::sync::Arc;

use log::{info, warn};
use tokio::sync::Mutex;

use super::{
    error::Error,
    model::DnsRecord,
    port::{DnsProvider, PublicAddress, RecordStore},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsOutcome {
    pub record: DnsRecord,
    /// The persisted record already matched, nothing was written.
    pub skipped: bool,
}

/// Keeps one DNS record per identity and at most one identity per domain.
///
/// The persisted snapshots in the [`RecordStore`] are the source of truth for
/// both the claim scan and the idempotence check. Every reconciliation holds
/// the same lock so two identities can't race for one domain.
pub struct DnsReconciler {
    provider: Arc<dyn DnsProvider>,
    store: Arc<dyn RecordStore>,
    address: Arc<dyn PublicAddress>,
    lock: Mutex<()>,
}

impl DnsReconciler {
    pub fn new(
        provider: Arc<dyn DnsProvider>,
        store: Arc<dyn RecordStore>,
        address: Arc<dyn PublicAddress>,
    ) -> Self {
        Self {
            provider,
            store,
            address,
            lock: Mutex::new(()),
        }
    }

    pub async fn reconcile(
        &self,
        identity: &str,
        zone: &str,
        domain: &str,
        proxied: bool,
        force: bool,
    ) -> Result<DnsOutcome, Error> {
        let _guard = self.lock.lock().await;

        for (claimant, record) in self.store.all().await? {
            if claimant == identity || record.zone_name != zone || record.name != domain {
                continue;
            }
            if !force {
                return Err(Error::DomainClaimed {
                    domain: domain.to_string(),
                    claimant,
                });
            }
            warn!("Removing DNS record {} claimed by {}", domain, claimant);
            self.remove_unlocked(&claimant).await?;
        }

        let current_address = match self.address.resolve().await {
            Ok(address) => Some(address),
            Err(e) => {
                warn!("Public address lookup failed, recreating record for {}: {}", identity, e);
                None
            }
        };

        let existing = self.store.load(identity).await?;
        if let (Some(existing), Some(address)) = (existing.as_ref(), current_address.as_ref()) {
            if existing.zone_name == zone && existing.name == domain && &existing.content == address {
                info!("DNS record {} for {} is up to date", domain, identity);
                return Ok(DnsOutcome {
                    record: existing.clone(),
                    skipped: true,
                });
            }
        }

        if existing.is_some() {
            self.remove_unlocked(identity).await?;
        }

        let content = match current_address {
            Some(address) => address,
            None => self.address.resolve().await?,
        };
        info!("Creating DNS record {} -> {} for {}", domain, content, identity);
        let record = self
            .provider
            .create_record(zone, domain, &content, proxied)
            .await?;
        self.store.save(identity, &record).await?;
        Ok(DnsOutcome {
            record,
            skipped: false,
        })
    }

    /// Drops the record and the claim held by `identity`, if any.
    pub async fn remove(&self, identity: &str) -> Result<Option<DnsRecord>, Error> {
        let _guard = self.lock.lock().await;
        self.remove_unlocked(identity).await
    }

    async fn remove_unlocked(&self, identity: &str) -> Result<Option<DnsRecord>, Error> {
        let Some(record) = self.store.load(identity).await? else {
            return Ok(None);
        };
        self.provider.remove_record(&record).await?;
        self.store.remove(identity).await?;
        Ok(Some(record))
    }
}
