use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use super::error::Error;

/// Deterministic identity of a (repository, variant) pair.
pub fn derive_identity(repository: &str, variant: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(repository.as_bytes());
    hasher.update(variant.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

/// A variant names a manifest file at the root of the checkout, so it must be
/// one plain file name.
pub fn check_variant(variant: &str) -> Result<(), Error> {
    let mut components = Path::new(variant).components();
    let single_name = matches!(components.next(), Some(Component::Normal(_))) && components.next().is_none();
    if !single_name || variant.contains(['/', '\\']) {
        return Err(Error::Validation(format!(
            "configuration '{}' must be a file name at the repository root",
            variant
        )));
    }
    Ok(())
}

pub fn variant_slug(variant: &str) -> String {
    variant.replace('.', "-")
}

pub fn checkout_directory(data_directory: &Path, identity: &str, variant: Option<&str>) -> PathBuf {
    match variant.filter(|variant| !variant.is_empty()) {
        Some(variant) => data_directory.join(format!("{}.{}", identity, variant_slug(variant))),
        None => data_directory.join(identity),
    }
}

/// Splits a checkout directory name into its identity and optional variant slug.
/// Names whose identity part is not a hex digest are rejected.
pub fn parse_checkout_name(name: &str) -> Option<(&str, Option<&str>)> {
    let (identity, slug) = match name.split_once('.') {
        Some((identity, slug)) if is_slug(slug) => (identity, Some(slug)),
        Some(_) => return None,
        None => (name, None),
    };
    let valid = identity.len() == Sha256::output_size() * 2
        && identity.chars().all(|c| c.is_ascii_hexdigit());
    valid.then_some((identity, slug))
}

/// Slugs have their dots replaced, so a separator or dot means a crafted name.
fn is_slug(slug: &str) -> bool {
    !slug.is_empty() && !slug.contains(['/', '\\', '.'])
}
