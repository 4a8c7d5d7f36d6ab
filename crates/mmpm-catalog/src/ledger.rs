//! The upgrade ledger: what currently has an upgrade available.

use crate::store::{self, Stored};
use crate::CatalogError;
use mmpm_types::{Package, PackageRecord};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// `{"mmpm": bool, "MagicMirror": bool, "packages": [...]}`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeLedger {
    /// mmpm itself has a newer release
    #[serde(rename = "mmpm", default)]
    pub manager: bool,
    /// MagicMirror has new upstream commits
    #[serde(rename = "MagicMirror", default)]
    pub host_app: bool,
    #[serde(default)]
    pub packages: Vec<PackageRecord>,
}

impl UpgradeLedger {
    /// Read the ledger, resetting the file to an empty ledger if it is corrupt.
    pub fn read(path: &Path) -> Result<Self, CatalogError> {
        match store::read::<Self>(path) {
            Stored::Present(ledger) => Ok(ledger),
            Stored::Absent => Ok(Self::default()),
            Stored::Corrupt => {
                warn!("Resetting {}", path.display());
                let ledger = Self::default();
                ledger.write(path)?;
                Ok(ledger)
            }
        }
    }

    /// Replace the ledger file.
    pub fn write(&self, path: &Path) -> Result<(), CatalogError> {
        store::write(path, self)
    }

    /// Total number of pending upgrades.
    pub fn count(&self) -> usize {
        usize::from(self.manager) + usize::from(self.host_app) + self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Whether `package` is listed as upgradable.
    pub fn contains(&self, package: &Package) -> bool {
        self.packages
            .iter()
            .any(|record| Package::from(record.clone()) == *package)
    }

    /// Drop `package` from the list.
    pub fn remove(&mut self, package: &Package) {
        self.packages.retain(|record| Package::from(record.clone()) != *package);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn clock() -> Package {
        Package::new("MMM-Clock", "someone", "https://github.com/someone/MMM-Clock", "", "Utility")
    }

    #[test]
    fn test_corrupt_ledger_self_heals() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("mmpm-available-upgrades.json");
        fs::write(&path, "{\"mmpm\": tru").unwrap();

        let ledger = UpgradeLedger::read(&path).unwrap();
        assert_eq!(ledger, UpgradeLedger::default());

        let on_disk: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            on_disk,
            serde_json::json!({"mmpm": false, "MagicMirror": false, "packages": []})
        );
    }

    #[test]
    fn test_missing_ledger_is_empty() {
        let tmp = TempDir::new().unwrap();
        let ledger = UpgradeLedger::read(&tmp.path().join("missing.json")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_count_and_remove() {
        let mut ledger = UpgradeLedger {
            manager: true,
            host_app: false,
            packages: vec![clock().to_record()],
        };
        assert_eq!(ledger.count(), 2);
        assert!(ledger.contains(&clock()));

        ledger.remove(&clock());
        assert_eq!(ledger.count(), 1);
        assert!(!ledger.contains(&clock()));
    }
}
