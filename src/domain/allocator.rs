use std::{collections::HashSet, net::TcpListener, sync::Mutex};

use log::debug;

use super::error::Error;

const CANDIDATE_BATCH: usize = 100;

/// Hands out local ports that no other application of this process holds.
/// Reservations live as long as the process.
#[derive(Default)]
pub struct PortAllocator {
    reserved: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn allocate(&self, explicit_host: &str) -> Result<String, Error> {
        if !explicit_host.is_empty() {
            return Ok(explicit_host.to_string());
        }
        let candidates = tokio::task::spawn_blocking(|| free_ports(CANDIDATE_BATCH))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        self.claim_first(candidates)
            .map(|port| format!("localhost:{}", port))
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::AddrInUse,
                    "every candidate port is already reserved",
                ))
            })
    }

    fn claim_first(&self, candidates: impl IntoIterator<Item = u16>) -> Option<u16> {
        let mut reserved = self.reserved.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let port = candidates.into_iter().find(|port| !reserved.contains(port))?;
        reserved.insert(port);
        debug!("Reserved port {}", port);
        Some(port)
    }
}

fn free_ports(count: usize) -> Result<Vec<u16>, Error> {
    // Listeners stay open until every port is read so the OS hands out distinct ones.
    let listeners = (0..count)
        .map(|_| TcpListener::bind("127.0.0.1:0"))
        .collect::<Result<Vec<_>, _>>()?;
    listeners
        .iter()
        .map(|listener| listener.local_addr().map(|addr| addr.port()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(Error::from)
}
