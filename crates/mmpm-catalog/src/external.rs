//! User-added packages that are not part of the scraped catalog.

use crate::store::{self, Stored};
use crate::CatalogError;
use mmpm_types::{Package, PackageRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// On-disk form: `{"External Packages": [...]}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ExternalStore {
    #[serde(rename = "External Packages", default)]
    packages: Vec<PackageRecord>,
}

/// Load every stored external package. A corrupt store reads as empty.
pub fn load(path: &Path) -> Vec<Package> {
    match store::read::<ExternalStore>(path) {
        Stored::Present(store) => store
            .packages
            .into_iter()
            .map(|record| {
                let mut package = Package::from(record);
                package.is_external = true;
                if package.directory.as_os_str().is_empty() {
                    package.directory = package.repository_name().into();
                }
                package
            })
            .collect(),
        Stored::Absent => Vec::new(),
        Stored::Corrupt => {
            warn!("Ignoring external packages in {}", path.display());
            Vec::new()
        }
    }
}

/// Replace the store with `packages`.
pub fn save(path: &Path, packages: &[Package]) -> Result<(), CatalogError> {
    let store = ExternalStore {
        packages: packages
            .iter()
            .map(|p| PackageRecord {
                directory: Some(p.directory.to_string_lossy().into_owned()),
                ..p.to_record()
            })
            .collect(),
    };
    store::write(path, &store)
}
