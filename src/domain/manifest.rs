use std::path::Path;

use serde::{Deserialize, Serialize};

use super::error::Error;

/// Deployment descriptor read from the checkout on every deploy and reload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub application: ApplicationSection,
    pub repository: RepositorySection,
    pub dns: DnsSection,
    #[serde(alias = "caddy")]
    pub proxy: ProxySection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSection {
    pub id: String,
    pub name: String,
    pub run: Vec<Vec<String>>,
    pub event_urls: EventUrls,
    pub health_endpoint: String,
    pub envs: Vec<String>,
    pub base_dir: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventUrls {
    One(String),
    Many(Vec<String>),
}

impl Default for EventUrls {
    fn default() -> Self {
        EventUrls::Many(Vec::new())
    }
}

impl EventUrls {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            EventUrls::One(url) => vec![url.clone()],
            EventUrls::Many(urls) => urls.clone(),
        }
        .into_iter()
        .filter(|url| !url.trim().is_empty())
        .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositorySection {
    pub branch: String,
    pub reload_on_push: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsSection {
    pub zone: String,
    pub domain: String,
    pub proxied: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxySection {
    pub domains: Vec<String>,
    pub host: String,
}

impl Manifest {
    pub fn parse(content: &str) -> Result<Manifest, Error> {
        let manifest: Manifest =
            toml::from_str(content).map_err(|e| Error::Validation(e.message().to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub async fn read(checkout: &Path, file_name: &str) -> Result<Manifest, Error> {
        let path = checkout.join(file_name);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            Error::Validation(format!("can't read {}: {}", path.display(), e))
        })?;
        Manifest::parse(&content).map_err(|e| match e {
            Error::Validation(message) => Error::Validation(format!("{} in {}", message, file_name)),
            other => other,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.application.run.is_empty() {
            return Err(Error::Validation(
                "application.run declares no commands".to_string(),
            ));
        }
        if let Some(position) = self
            .application
            .run
            .iter()
            .position(|step| step.first().map_or(true, |program| program.is_empty()))
        {
            return Err(Error::Validation(format!(
                "application.run step {} has no program",
                position + 1
            )));
        }
        if let Some(env) = self.application.envs.iter().find(|env| !env.contains('=')) {
            return Err(Error::Validation(format!(
                "application.envs entry '{}' is not KEY=VALUE",
                env
            )));
        }
        if !self.dns.zone.is_empty() && self.dns.domain.is_empty() {
            return Err(Error::Validation(format!(
                "dns.domain is required for zone {}",
                self.dns.zone
            )));
        }
        Ok(())
    }

    /// Declared environment as key/value pairs.
    pub fn environment(&self) -> Vec<(String, String)> {
        self.application
            .envs
            .iter()
            .filter_map(|env| env.split_once('='))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }
}
