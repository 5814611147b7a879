use std::{collections::HashMap, sync::Arc};

use log::info;
use tokio::sync::RwLock;

use super::{
    allocator::PortAllocator,
    dns::{DnsOutcome, DnsReconciler},
    error::Error,
    model::{Health, RoutingRequest},
    port::{HealthProbe, ProbeFailure, RouteReconciler},
};

#[derive(Debug, Clone)]
pub struct AppliedRouting {
    pub request: RoutingRequest,
    pub host: String,
    pub dns: Option<DnsOutcome>,
}

/// Turns a routing request into a reachable host: local endpoint, proxy
/// route, then DNS record when a zone is declared.
pub struct RoutingService {
    allocator: PortAllocator,
    routes: Arc<dyn RouteReconciler>,
    dns: DnsReconciler,
    probe: Arc<dyn HealthProbe>,
    applied: RwLock<HashMap<String, AppliedRouting>>,
}

impl RoutingService {
    pub fn new(
        allocator: PortAllocator,
        routes: Arc<dyn RouteReconciler>,
        dns: DnsReconciler,
        probe: Arc<dyn HealthProbe>,
    ) -> Self {
        Self {
            allocator,
            routes,
            dns,
            probe,
            applied: RwLock::new(HashMap::new()),
        }
    }

    pub async fn apply(
        &self,
        identity: &str,
        request: RoutingRequest,
    ) -> Result<AppliedRouting, Error> {
        let upstream = self.allocator.allocate(&request.proxy.host).await?;
        info!("Setting up proxy route for {} to {}", identity, upstream);
        let host = self
            .routes
            .reconcile(
                identity,
                &request.proxy.domains,
                &request.proxy.paths,
                &upstream,
            )
            .await?;

        let dns = match request.dns_zone() {
            None => None,
            Some(zone) => {
                info!("Setting up DNS for {}", identity);
                Some(
                    self.dns
                        .reconcile(
                            identity,
                            zone,
                            &request.dns.domain,
                            request.dns.proxied,
                            request.force,
                        )
                        .await?,
                )
            }
        };

        let applied = AppliedRouting { request, host, dns };
        self.applied
            .write()
            .await
            .insert(identity.to_string(), applied.clone());
        Ok(applied)
    }

    pub async fn applied(&self, identity: &str) -> Option<AppliedRouting> {
        self.applied.read().await.get(identity).cloned()
    }

    /// Forgets the applied routing and drops the DNS claim held by `identity`.
    pub async fn release(&self, identity: &str) -> Result<(), Error> {
        self.applied.write().await.remove(identity);
        if let Some(record) = self.dns.remove(identity).await? {
            info!("Removed DNS record {} of {}", record.name, identity);
        }
        Ok(())
    }

    /// Probes the health endpoint of the last routing applied for `identity`.
    pub async fn health(&self, identity: &str) -> Result<Health, Error> {
        let applied = self
            .applied(identity)
            .await
            .ok_or_else(|| Error::NotFound(format!("Routing for {}", identity)))?;
        let mut health = Health {
            configuration: applied.request.clone(),
            host: applied.host.clone(),
            dial_error: None,
            service_error: None,
            error: false,
        };
        match self
            .probe
            .probe(&applied.host, &applied.request.health.check_url)
            .await
        {
            Ok(()) => {}
            Err(ProbeFailure::Dial(message)) => {
                health.dial_error = Some(message);
                health.error = true;
            }
            Err(ProbeFailure::Service(service_error)) => {
                health.service_error = Some(service_error);
                health.error = true;
            }
        }
        Ok(health)
    }
}
