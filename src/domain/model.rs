use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::manifest::Manifest;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppEvent {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AppEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Cloning,
    Configuring,
    Launching,
    Running,
    /// Run sequence completed with every step exiting successfully.
    Exited,
    Failed,
    Reloading,
    Killing,
    Stopped,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Launching | Phase::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployRequest {
    pub repository: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Alternate manifest file, which also qualifies the identity.
    #[serde(default, alias = "variant")]
    pub config: Option<String>,
}

impl DeployRequest {
    pub fn new(repository: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            branch: None,
            config: None,
        }
    }

    pub fn variant(&self) -> Option<&str> {
        self.config.as_deref().filter(|variant| !variant.is_empty())
    }

    pub fn branch(&self) -> Option<&str> {
        self.branch.as_deref().filter(|branch| !branch.is_empty())
    }
}

/// Desired routing for one identity, as sent to the launch endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RoutingRequest {
    pub dns: DnsRequest,
    #[serde(alias = "caddy")]
    pub proxy: ProxyRequest,
    pub health: HealthRequest,
    pub force: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DnsRequest {
    pub zone: String,
    pub domain: String,
    pub proxied: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProxyRequest {
    pub domains: Vec<String>,
    pub paths: Vec<String>,
    pub host: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthRequest {
    pub check_url: String,
}

impl RoutingRequest {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        Self {
            dns: DnsRequest {
                zone: manifest.dns.zone.clone(),
                domain: manifest.dns.domain.clone(),
                proxied: manifest.dns.proxied,
            },
            proxy: ProxyRequest {
                domains: manifest.proxy.domains.clone(),
                paths: Vec::new(),
                host: manifest.proxy.host.clone(),
            },
            health: HealthRequest {
                check_url: manifest.application.health_endpoint.clone(),
            },
            force: false,
        }
    }

    /// Zone to reconcile, when DNS is requested at all.
    pub fn dns_zone(&self) -> Option<&str> {
        Some(self.dns.zone.as_str()).filter(|zone| !zone.is_empty())
    }
}

/// Snapshot of the DNS record written for one identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DnsRecord {
    pub zone_name: String,
    pub name: String,
    pub content: String,
    pub proxied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Health {
    pub configuration: RoutingRequest,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dial_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_error: Option<ServiceError>,
    pub error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceError {
    pub code: u16,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub id: String,
    pub repository: String,
    pub branch: Option<String>,
    pub config: Option<String>,
    pub directory: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppStatus {
    pub application: ApplicationInfo,
    pub status: Phase,
    pub pid: Option<u32>,
    pub host: Option<String>,
    pub manifest: Option<Manifest>,
    pub events: Vec<AppEvent>,
    pub health: Option<Health>,
}
