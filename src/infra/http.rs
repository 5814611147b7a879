use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use reqwest::Client;

use crate::domain::{
    model::{AppEvent, ServiceError},
    port::{EventSink, HealthProbe, ProbeFailure, PublicAddress},
    Error,
};

fn client(timeout: Duration) -> Result<Client, Error> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| Error::provider("http client", e))
}

/// Asks an echo service which address this host is reachable at.
pub struct EchoAddressLookup {
    client: Client,
    url: String,
}

impl EchoAddressLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PublicAddress for EchoAddressLookup {
    async fn resolve(&self) -> Result<String, Error> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::provider("ip lookup", e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::provider("ip lookup", e))?;
        let address = body.trim();
        if !status.is_success() || address.is_empty() {
            return Err(Error::provider("ip lookup", format!("{}: '{}'", status, address)));
        }
        Ok(address.to_string())
    }
}

pub struct HttpHealthProbe {
    client: Client,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: client(timeout)?,
        })
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, host: &str, path: &str) -> Result<(), ProbeFailure> {
        let url = format!("http://{}/{}", host, path.trim_start_matches('/'));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ProbeFailure::Dial(format!("failed to contact {}: {}", url, e)))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ProbeFailure::Service(ServiceError {
            code: status.as_u16(),
            content: response.text().await.unwrap_or_default(),
        }))
    }
}

/// Posts every event as JSON to the subscribed URLs; failures are only logged.
pub struct HttpEventSink {
    client: Client,
}

impl HttpEventSink {
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            client: client(timeout)?,
        })
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn publish(&self, urls: &[String], event: &AppEvent) {
        join_all(urls.iter().map(|url| async move {
            match self.client.post(url).json(event).send().await {
                Ok(response) if response.status().is_success() => debug!("Event delivered to {}", url),
                Ok(response) => warn!("Event rejected by {}: {}", url, response.status()),
                Err(e) => warn!("Failed to deliver event to {}: {}", url, e),
            }
        }))
        .await;
    }
}
