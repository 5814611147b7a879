use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    config::CaddyConfig,
    domain::{port::RouteReconciler, Error},
};

const PROVIDER: &str = "caddy";
const UNKNOWN_OBJECT: &str = "unknown object ID";

#[derive(Debug, Serialize)]
struct CaddyRoute {
    #[serde(rename = "@id")]
    id: String,
    #[serde(rename = "match", skip_serializing_if = "Vec::is_empty")]
    matchers: Vec<RouteMatch>,
    handle: Vec<Handler>,
    #[serde(skip_serializing_if = "Option::is_none")]
    terminal: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RouteMatch {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    host: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    path: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "handler", rename_all = "snake_case")]
enum Handler {
    Subroute { routes: Vec<Subroute> },
    ReverseProxy { upstreams: Vec<Upstream> },
}

#[derive(Debug, Serialize)]
struct Subroute {
    handle: Vec<Handler>,
}

#[derive(Debug, Serialize)]
struct Upstream {
    dial: String,
}

/// Drives the Caddy admin API so each identity owns exactly one route.
pub struct CaddyReconciler {
    client: Client,
    config: CaddyConfig,
}

impl CaddyReconciler {
    pub fn new(config: CaddyConfig, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::provider(PROVIDER, e))?;
        Ok(Self { client, config })
    }

    fn route_id(&self, identity: &str) -> String {
        format!("{}-{}", self.config.route_prefix, identity)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api.trim_end_matches('/'), path)
    }

    fn build_route(&self, identity: &str, hosts: &[String], paths: &[String], upstream: &str) -> CaddyRoute {
        let matchers = if hosts.is_empty() && paths.is_empty() {
            Vec::new()
        } else {
            vec![RouteMatch {
                host: hosts.to_vec(),
                path: paths.to_vec(),
            }]
        };
        CaddyRoute {
            id: self.route_id(identity),
            terminal: (!matchers.is_empty()).then_some(true),
            matchers,
            handle: vec![Handler::Subroute {
                routes: vec![Subroute {
                    handle: vec![Handler::ReverseProxy {
                        upstreams: vec![Upstream {
                            dial: upstream.to_string(),
                        }],
                    }],
                }],
            }],
        }
    }

    fn server_name(&self) -> &str {
        self.config
            .route_path
            .split('/')
            .skip_while(|segment| *segment != "servers")
            .nth(1)
            .unwrap_or("srv0")
    }

    fn default_config(&self) -> Value {
        json!({
            "apps": {
                "http": {
                    "servers": {
                        self.server_name(): {
                            "automatic_https": { "disable": !self.config.auto_https },
                            "listen": [self.config.listen],
                            "routes": []
                        }
                    }
                }
            }
        })
    }

    async fn delete_route(&self, route_id: &str) -> Result<(), Error> {
        let response = self
            .client
            .delete(self.url(&format!("id/{}", route_id)))
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, e))?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if body.contains(UNKNOWN_OBJECT) {
            debug!("No previous route {}", route_id);
            return Ok(());
        }
        Err(Error::provider(PROVIDER, format!("{}: {}", status, body.trim())))
    }

    async fn submit_route(&self, route: &CaddyRoute) -> Result<(), (StatusCode, String)> {
        let response = self
            .client
            .post(self.url(&self.config.route_path))
            .json(route)
            .send()
            .await
            .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        Err((status, response.text().await.unwrap_or_default()))
    }

    /// True when Caddy runs without any configuration loaded.
    async fn is_uninitialized(&self) -> Result<bool, Error> {
        let body = self
            .client
            .get(self.url("config/"))
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, e))?
            .text()
            .await
            .map_err(|e| Error::provider(PROVIDER, e))?;
        Ok(body.trim() == "null")
    }

    async fn bootstrap(&self) -> Result<(), Error> {
        info!("Initializing Caddy configuration");
        let response = self
            .client
            .post(self.url("load"))
            .json(&self.default_config())
            .send()
            .await
            .map_err(|e| Error::provider(PROVIDER, e))?;
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::provider(
            PROVIDER,
            format!("failed to initialize configuration: {}: {}", status, body.trim()),
        ))
    }

    /// Startup check that the admin API answers.
    pub async fn ping(&self) -> Result<(), Error> {
        self.is_uninitialized().await.map(|_| ())
    }
}

#[async_trait]
impl RouteReconciler for CaddyReconciler {
    async fn reconcile(
        &self,
        identity: &str,
        hosts: &[String],
        paths: &[String],
        upstream: &str,
    ) -> Result<String, Error> {
        let route = self.build_route(identity, hosts, paths, upstream);
        self.delete_route(&route.id).await?;

        let Err((status, body)) = self.submit_route(&route).await else {
            return Ok(upstream.to_string());
        };
        if !self.is_uninitialized().await? {
            return Err(Error::provider(PROVIDER, format!("{}: {}", status, body.trim())));
        }
        self.bootstrap().await?;
        self.submit_route(&route)
            .await
            .map_err(|(status, body)| Error::provider(PROVIDER, format!("{}: {}", status, body.trim())))?;
        Ok(upstream.to_string())
    }
}
