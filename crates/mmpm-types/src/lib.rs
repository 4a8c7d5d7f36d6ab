//! Core types for the MagicMirror package manager.
//!
//! This crate defines the catalog entry (`Package`), its on-disk wire form
//! (`PackageRecord`) and the `Outcome` returned by per-package operations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};

/// Placeholder used when the wiki leaves a field blank.
pub const NA: &str = "N/A";

/// Reserved category for packages the user added by hand.
pub const EXTERNAL_PACKAGES: &str = "External Packages";

/// Name of the package manager itself (also a ledger key).
pub const MANAGER_NAME: &str = "mmpm";

/// The manager's companion module, listed on the wiki but never offered.
pub const COMPANION_MODULE: &str = "MMM-mmpm";

/// Name of the host dashboard application (also a ledger key).
pub const HOST_APP_NAME: &str = "MagicMirror";

/// One plugin entry, either scraped from the wiki or added by the user.
///
/// Equality and hashing only consider the lowercased title and repository.
#[derive(Debug, Clone)]
pub struct Package {
    title: String,
    author: String,
    repository: String,
    /// Free-form description
    pub description: String,
    /// Wiki category (or [`EXTERNAL_PACKAGES`])
    pub category: String,
    /// Install location relative to the modules directory, empty until known
    pub directory: PathBuf,
    /// Whether discovery found this package on disk
    pub is_installed: bool,
    /// User-added, not part of the scraped catalog
    pub is_external: bool,
    /// Result of the last update pass. Never persisted with the package.
    pub is_upgradable: bool,
}

impl Package {
    /// Create a package, sanitizing the title and author and normalizing the
    /// repository URL to end in `.git`.
    pub fn new(
        title: impl AsRef<str>,
        author: impl AsRef<str>,
        repository: impl AsRef<str>,
        description: impl AsRef<str>,
        category: impl AsRef<str>,
    ) -> Self {
        Self {
            title: sanitize(title.as_ref()),
            author: sanitize(author.as_ref()),
            repository: normalize_repository(repository.as_ref()),
            description: description.as_ref().trim().to_string(),
            category: category.as_ref().trim().to_string(),
            directory: PathBuf::new(),
            is_installed: false,
            is_external: false,
            is_upgradable: false,
        }
    }

    /// Create a user-added package in the [`EXTERNAL_PACKAGES`] category.
    ///
    /// The directory is derived from the repository's last path segment.
    pub fn external(
        title: impl AsRef<str>,
        author: impl AsRef<str>,
        repository: impl AsRef<str>,
        description: impl AsRef<str>,
    ) -> Self {
        let mut package = Self::new(title, author, repository, description, EXTERNAL_PACKAGES);
        package.directory = PathBuf::from(package.repository_name());
        package.is_external = true;
        package
    }

    /// Set the install directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Replace the repository URL, keeping the `.git` suffix invariant.
    pub fn set_repository(&mut self, repository: impl AsRef<str>) {
        self.repository = normalize_repository(repository.as_ref());
    }

    /// Last path segment of the repository without `.git`.
    ///
    /// Handles both `https://host/user/repo.git` and `git@host:user/repo.git`.
    pub fn repository_name(&self) -> String {
        self.repository
            .trim_end_matches('/')
            .rsplit(['/', ':'])
            .next()
            .unwrap_or_default()
            .trim_end_matches(".git")
            .to_string()
    }

    /// Directory name the package is (or would be) installed under.
    pub fn install_dir(&self) -> PathBuf {
        if self.directory.as_os_str().is_empty() {
            PathBuf::from(self.repository_name())
        } else {
            self.directory.clone()
        }
    }

    /// Absolute install path under the given modules directory.
    ///
    /// `None` unless the install directory is a non-empty relative path made
    /// only of plain names, so the result can never leave `modules_dir`.
    pub fn install_path(&self, modules_dir: &Path) -> Option<PathBuf> {
        let dir = self.install_dir();
        let mut components = dir.components().peekable();

        components.peek()?;
        if components.all(|c| matches!(c, Component::Normal(_))) {
            Some(modules_dir.join(dir))
        } else {
            None
        }
    }

    /// Subset serialization used by the catalog cache, external store and ledger.
    pub fn to_record(&self) -> PackageRecord {
        PackageRecord {
            title: self.title.clone(),
            author: self.author.clone(),
            category: self.category.clone(),
            repository: self.repository.clone(),
            description: self.description.clone(),
            directory: None,
            is_installed: None,
            is_external: None,
            is_upgradable: None,
        }
    }

    /// Full serialization including install state, used by listings and the API.
    pub fn to_full_record(&self) -> PackageRecord {
        PackageRecord {
            directory: Some(self.directory.to_string_lossy().into_owned()),
            is_installed: Some(self.is_installed),
            is_external: Some(self.is_external),
            is_upgradable: Some(self.is_upgradable),
            ..self.to_record()
        }
    }
}

impl Default for Package {
    fn default() -> Self {
        Self::new(NA, NA, NA, NA, NA)
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.title.to_lowercase() == other.title.to_lowercase()
            && self.repository.to_lowercase() == other.repository.to_lowercase()
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.title.to_lowercase().hash(state);
        self.repository.to_lowercase().hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.title, self.repository)
    }
}

/// JSON form of a package.
///
/// Install-state fields are only present in full serializations; missing
/// text fields fall back to [`NA`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    #[serde(default = "na")]
    pub title: String,
    #[serde(default = "na")]
    pub author: String,
    #[serde(default = "na")]
    pub category: String,
    #[serde(default = "na")]
    pub repository: String,
    #[serde(default = "na")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_installed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_external: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_upgradable: Option<bool>,
}

fn na() -> String {
    NA.to_string()
}

impl From<PackageRecord> for Package {
    fn from(record: PackageRecord) -> Self {
        let mut package = Package::new(
            &record.title,
            &record.author,
            &record.repository,
            &record.description,
            &record.category,
        );

        if let Some(directory) = record.directory.filter(|d| !d.trim().is_empty()) {
            package.directory = PathBuf::from(directory.trim());
        }

        package.is_installed = record.is_installed.unwrap_or(false);
        package.is_external =
            record.is_external.unwrap_or(false) || package.category == EXTERNAL_PACKAGES;
        // is_upgradable is transient and deliberately not restored
        package
    }
}

impl From<&Package> for PackageRecord {
    fn from(package: &Package) -> Self {
        package.to_record()
    }
}

/// Result of a per-package operation.
///
/// Replaces the "empty string means success" convention: failures carry the
/// text the caller should display, skips carry the reason nothing happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum Outcome {
    /// The operation completed
    Success,
    /// A precondition failed or the user declined; nothing changed
    Skipped(String),
    /// The operation ran and failed
    Failure(String),
}

impl Outcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// The failure text or skip reason, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Skipped(msg) | Self::Failure(msg) => Some(msg),
        }
    }
}

/// Strip forward slashes, then collapse and trim whitespace.
pub fn sanitize(text: &str) -> String {
    text.replace('/', "").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim a repository URL and guarantee a `.git` suffix.
pub fn normalize_repository(repository: &str) -> String {
    let repository = repository.trim();

    if repository.ends_with(".git") {
        repository.to_string()
    } else {
        format!("{}.git", repository)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identity_ignores_case_and_extra_fields() {
        let a = Package::new(
            "MMM-Weather",
            "alice",
            "https://github.com/a/MMM-Weather",
            "one",
            "Weather",
        )
        .with_directory("MMM-Weather");
        let b = Package::new(
            "mmm-weather",
            "bob",
            "HTTPS://GITHUB.COM/A/MMM-WEATHER.git",
            "two",
            "Other",
        );

        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_identity_differs_on_repository() {
        let a = Package::new("MMM-Clock", "x", "https://github.com/a/MMM-Clock", "", "Clock");
        let b = Package::new("MMM-Clock", "x", "https://github.com/b/MMM-Clock", "", "Clock");
        assert_ne!(a, b);
    }

    #[test]
    fn test_repository_normalization() {
        let pkg = Package::new("t", "a", "https://github.com/a/repo", "", "");
        assert_eq!(pkg.repository(), "https://github.com/a/repo.git");

        let pkg = Package::new("t", "a", "https://github.com/a/repo.git", "", "");
        assert_eq!(pkg.repository(), "https://github.com/a/repo.git");

        let mut pkg = Package::default();
        pkg.set_repository("git@github.com:a/other");
        assert_eq!(pkg.repository(), "git@github.com:a/other.git");
    }

    #[test]
    fn test_title_and_author_sanitization() {
        let pkg = Package::new("My // Package", " some/one ", "r", "", "");
        assert_eq!(pkg.title(), "My Package");
        assert_eq!(pkg.author(), "someone");
        assert!(!pkg.title().contains('/'));
    }

    #[test]
    fn test_repository_name() {
        let pkg = Package::new("t", "a", "https://github.com/user/MMM-Foo.git", "", "");
        assert_eq!(pkg.repository_name(), "MMM-Foo");

        let pkg = Package::new("t", "a", "git@gitlab.com:user/MMM-Bar", "", "");
        assert_eq!(pkg.repository_name(), "MMM-Bar");
    }

    #[test]
    fn test_external_package() {
        let pkg = Package::external("Mine", "me", "https://github.com/me/MMM-Mine", "desc");
        assert!(pkg.is_external);
        assert_eq!(pkg.category, EXTERNAL_PACKAGES);
        assert_eq!(pkg.directory, PathBuf::from("MMM-Mine"));
    }

    #[test]
    fn test_install_dir_falls_back_to_repository_name() {
        let pkg = Package::new("t", "a", "https://github.com/user/MMM-Foo", "", "");
        assert_eq!(pkg.install_dir(), PathBuf::from("MMM-Foo"));
        assert_eq!(
            pkg.with_directory("custom").install_path(Path::new("/mm/modules")),
            Some(PathBuf::from("/mm/modules/custom"))
        );
    }

    #[test]
    fn test_install_path_stays_inside_modules_dir() {
        let modules = Path::new("/mm/modules");
        let pkg = Package::new("t", "a", "https://github.com/user/MMM-Foo", "", "");

        for dir in ["../config", "/etc", "MMM-Foo/../../config", "./MMM-Foo"] {
            assert_eq!(pkg.clone().with_directory(dir).install_path(modules), None, "{}", dir);
        }

        let dotted = Package::new("t", "a", "https://github.com/user/..", "", "");
        assert_eq!(dotted.install_path(modules), None);
    }

    #[test]
    fn test_record_does_not_restore_upgradable() {
        let mut pkg = Package::new("t", "a", "r", "d", "c").with_directory("dir");
        pkg.is_installed = true;
        pkg.is_upgradable = true;

        let json = serde_json::to_string(&pkg.to_full_record()).unwrap();
        let restored: Package = serde_json::from_str::<PackageRecord>(&json).unwrap().into();

        assert!(restored.is_installed);
        assert!(!restored.is_upgradable);
        assert_eq!(restored.directory, PathBuf::from("dir"));
    }

    #[test]
    fn test_subset_record_omits_state() {
        let json = serde_json::to_value(Package::new("t", "a", "r", "d", "c").to_record()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 5);
        assert!(!object.contains_key("is_installed"));
    }

    #[test]
    fn test_record_defaults_missing_fields() {
        let record: PackageRecord = serde_json::from_str(r#"{"title": "Only"}"#).unwrap();
        assert_eq!(record.author, NA);
        assert_eq!(record.directory, None);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(Outcome::failure("boom")).unwrap();
        assert_eq!(json, serde_json::json!({"status": "failure", "message": "boom"}));
        assert!(Outcome::Success.is_success());
        assert_eq!(Outcome::skipped("already installed").message(), Some("already installed"));
    }
}
