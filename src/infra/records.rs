use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::warn;

use crate::domain::{model::DnsRecord, port::RecordStore, Error};

/// One JSON file per identity, named after the identity.
pub struct FileRecordStore {
    directory: PathBuf,
}

impl FileRecordStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn path(&self, identity: &str) -> Result<PathBuf, Error> {
        if identity.is_empty() || identity.contains(['/', '\\']) || identity.starts_with('.') {
            return Err(Error::Validation(format!("invalid identity '{}'", identity)));
        }
        Ok(self.directory.join(identity))
    }
}

async fn read_record(path: &Path) -> Result<Option<DnsRecord>, Error> {
    let content = match tokio::fs::read(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn load(&self, identity: &str) -> Result<Option<DnsRecord>, Error> {
        read_record(&self.path(identity)?).await
    }

    async fn save(&self, identity: &str, record: &DnsRecord) -> Result<(), Error> {
        let path = self.path(identity)?;
        tokio::fs::create_dir_all(&self.directory).await?;
        let content = serde_json::to_vec_pretty(record)
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }

    async fn remove(&self, identity: &str) -> Result<(), Error> {
        match tokio::fs::remove_file(self.path(identity)?).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn all(&self) -> Result<Vec<(String, DnsRecord)>, Error> {
        let mut entries = match tokio::fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Some(identity) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            match read_record(&entry.path()).await {
                Ok(Some(record)) => records.push((identity, record)),
                Ok(None) => {}
                Err(e) => warn!("Ignoring unreadable record {}: {}", identity, e),
            }
        }
        records.sort_by(|(left, _), (right, _)| left.cmp(right));
        Ok(records)
    }
}
