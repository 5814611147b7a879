use std::sync::Arc;

use anyhow::Context;
use config::load_config;
use domain::{allocator::PortAllocator, dns::DnsReconciler, routing::RoutingService, ApplicationManager};
use infra::{
    caddy::CaddyReconciler,
    cloudflare::CloudflareProvider,
    git::GitSourceControl,
    http::{EchoAddressLookup, HttpEventSink, HttpHealthProbe},
    records::FileRecordStore,
    web::router,
};
use log::{info, warn};
use tokio::net::TcpListener;

mod config;
mod domain;
mod infra;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Start Rokku - push to deploy on a single host");

    let config = load_config()?;
    info!("Loaded config {:?}", config);
    let timeouts = &config.timeouts;

    let caddy = Arc::new(CaddyReconciler::new(config.caddy.clone(), timeouts.provider())?);
    if let Err(e) = caddy.ping().await {
        warn!("Caddy admin API at {} is not reachable: {}", config.caddy.api, e);
    }

    let dns = DnsReconciler::new(
        Arc::new(CloudflareProvider::new(config.cloudflare.clone(), timeouts.provider())?),
        Arc::new(FileRecordStore::new(&config.records_directory)),
        Arc::new(EchoAddressLookup::new(&config.public_ip_url, timeouts.status())?),
    );
    let routing = Arc::new(RoutingService::new(
        PortAllocator::new(),
        caddy,
        dns,
        Arc::new(HttpHealthProbe::new(timeouts.status())?),
    ));
    let manager = Arc::new(ApplicationManager::new(
        &config.data_directory,
        &config.manifest_name,
        Arc::new(GitSourceControl::new(timeouts.source_control())),
        routing,
        Arc::new(HttpEventSink::new(timeouts.event())?),
    ));

    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("Can't listen on {}", config.listen))?;
    info!("Listening on {}", config.listen);

    let recovering = manager.clone();
    tokio::spawn(async move {
        match recovering.recover().await {
            Ok(deployed) => info!("[startup] Recovered {} application(s)", deployed.len()),
            Err(e) => warn!("[startup] Recovery failed: {}", e),
        }
    });

    axum::serve(listener, router(manager.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("Stopping every application");
    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Can't listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Can't listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {},
        _ = terminate => {},
    }
    info!("Shutdown requested");
}
