use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;

use crate::{
    config::CloudflareConfig,
    domain::{model::DnsRecord, port::DnsProvider, Error},
};

const PROVIDER: &str = "cloudflare";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    success: bool,
    #[serde(default)]
    errors: Vec<ApiMessage>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Zone {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Record {
    id: String,
    #[serde(default)]
    content: String,
}

/// Cloudflare v4 API client managing A records, one bearer token per zone.
pub struct CloudflareProvider {
    client: Client,
    config: CloudflareConfig,
}

impl CloudflareProvider {
    pub fn new(config: CloudflareConfig, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::provider(PROVIDER, e))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api.trim_end_matches('/'), path)
    }

    fn token(&self, zone: &str) -> Result<&str, Error> {
        self.config
            .token_for(zone)
            .ok_or_else(|| Error::Validation(format!("no Cloudflare token configured for zone {}", zone)))
    }

    async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, Error> {
        let response = request.send().await.map_err(|e| Error::provider(PROVIDER, e))?;
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::provider(PROVIDER, e))?;
        let envelope: Envelope<T> = serde_json::from_str(&body)
            .map_err(|_| Error::provider(PROVIDER, format!("{}: {}", status, body.trim())))?;
        match envelope.result {
            Some(result) if envelope.success && status.is_success() => Ok(result),
            _ => Err(Error::provider(PROVIDER, describe(status, &envelope.errors))),
        }
    }

    async fn zone_id(&self, zone: &str, token: &str) -> Result<String, Error> {
        let zones: Vec<Zone> = Self::send(
            self.client
                .get(self.url("zones"))
                .bearer_auth(token)
                .query(&[("name", zone)]),
        )
        .await?;
        zones
            .into_iter()
            .next()
            .map(|zone| zone.id)
            .ok_or_else(|| Error::provider(PROVIDER, format!("zone {} not found", zone)))
    }

    async fn find_records(&self, zone_id: &str, token: &str, record: &DnsRecord) -> Result<Vec<String>, Error> {
        let found: Vec<Record> = Self::send(
            self.client
                .get(self.url(&format!("zones/{}/dns_records", zone_id)))
                .bearer_auth(token)
                .query(&[("type", "A"), ("name", record.name.as_str())]),
        )
        .await?;
        Ok(found
            .into_iter()
            .filter(|candidate| candidate.content == record.content)
            .map(|candidate| candidate.id)
            .collect())
    }

    async fn delete(&self, zone_id: &str, token: &str, record_id: &str) -> Result<(), Error> {
        let response = self
            .client
            .delete(self.url(&format!("zones/{}/dns_records/{}", zone_id, record_id)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, e))?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => {
                debug!("Record {} already gone", record_id);
                Ok(())
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::provider(PROVIDER, format!("{}: {}", status, body.trim())))
            }
        }
    }
}

fn describe(status: StatusCode, errors: &[ApiMessage]) -> String {
    if errors.is_empty() {
        return status.to_string();
    }
    errors
        .iter()
        .map(|error| format!("{} ({})", error.message, error.code))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait]
impl DnsProvider for CloudflareProvider {
    async fn create_record(
        &self,
        zone: &str,
        name: &str,
        content: &str,
        proxied: bool,
    ) -> Result<DnsRecord, Error> {
        let token = self.token(zone)?;
        let zone_id = self.zone_id(zone, token).await?;
        let created: Record = Self::send(
            self.client
                .post(self.url(&format!("zones/{}/dns_records", zone_id)))
                .bearer_auth(token)
                .json(&json!({
                    "type": "A",
                    "name": name,
                    "content": content,
                    "proxied": proxied,
                    "ttl": 1
                })),
        )
        .await?;
        info!("Created record {} -> {} in zone {}", name, content, zone);
        Ok(DnsRecord {
            zone_name: zone.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            proxied,
            id: Some(created.id),
        })
    }

    async fn remove_record(&self, record: &DnsRecord) -> Result<(), Error> {
        let token = self.token(&record.zone_name)?;
        let zone_id = self.zone_id(&record.zone_name, token).await?;
        let ids = match &record.id {
            Some(id) => vec![id.clone()],
            None => self.find_records(&zone_id, token, record).await?,
        };
        for id in ids {
            self.delete(&zone_id, token, &id).await?;
        }
        info!("Removed record {} from zone {}", record.name, record.zone_name);
        Ok(())
    }
}
