use std::path::{Path, PathBuf};

use log::{info, warn};
use split_iter::Splittable;

use super::{
    error::Error,
    identity::{parse_checkout_name, variant_slug},
    port::SourceControl,
};

/// A checkout found on disk that can be deployed again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveredCheckout {
    pub directory: PathBuf,
    pub repository: String,
    pub variant: Option<String>,
}

/// Lists the valid checkouts under `data_directory`. Directories that are not
/// named after an identity, have no origin remote, or whose variant can't be
/// matched to a manifest file are left out.
pub async fn discover(
    data_directory: &Path,
    source_control: &dyn SourceControl,
) -> Result<Vec<RecoveredCheckout>, Error> {
    let mut entries = match tokio::fs::read_dir(data_directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut candidates = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            candidates.push(inspect(&entry.path(), source_control).await);
        }
    }

    let (pruned, valid) = candidates.into_iter().split(|candidate| candidate.is_ok());
    for reason in pruned.filter_map(Result::err) {
        warn!("[startup] Skipping {}", reason);
    }
    Ok(valid.filter_map(Result::ok).collect())
}

async fn inspect(
    directory: &Path,
    source_control: &dyn SourceControl,
) -> Result<RecoveredCheckout, String> {
    let name = directory
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format!("{}: unreadable name", directory.display()))?;
    let (_, slug) = parse_checkout_name(name)
        .ok_or_else(|| format!("{}: not an application directory", directory.display()))?;
    let repository = source_control
        .origin_url(directory)
        .await
        .map_err(|e| format!("{}: {}", directory.display(), e))?;
    let variant = match slug {
        Some(slug) => Some(find_variant(directory, slug).await.ok_or_else(|| {
            format!("{}: no manifest matches variant {}", directory.display(), slug)
        })?),
        None => None,
    };
    info!("[startup] Found {} from {}", directory.display(), repository);
    Ok(RecoveredCheckout {
        directory: directory.to_path_buf(),
        repository,
        variant,
    })
}

/// The directory suffix is a lossy slug of the manifest name; the manifest
/// file in the checkout root whose slug matches is the variant.
async fn find_variant(directory: &Path, slug: &str) -> Option<String> {
    let mut entries = tokio::fs::read_dir(directory).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if let Some(name) = entry.file_name().to_str() {
            if variant_slug(name) == slug {
                return Some(name.to_string());
            }
        }
    }
    None
}
