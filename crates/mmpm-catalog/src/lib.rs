//! The MagicMirror package catalog.
//!
//! [`Catalog`] owns every known package: the scraped wiki entries (cached on
//! disk for 12 hours) plus the user's external packages. After each load it
//! scans the modules directory to work out which packages are installed, and
//! it records which of those have upstream changes in the upgrade ledger.
//!
//! All collaborators (configuration, process execution, prompts, scraping)
//! are injected through [`CatalogContext`].

pub mod discovery;
pub mod external;
mod ledger;
mod lifecycle;
pub mod scraper;
mod shared;
mod store;

pub use ledger::UpgradeLedger;
pub use lifecycle::PackageLifecycle;
pub use scraper::{parse_wiki_page, ScrapeError, Scraper, WikiScraper, WIKI_URL};
pub use shared::SharedCatalog;

use chrono::{DateTime, Duration, Utc};
use mmpm_config::{ConfigAccessor, ConfigError, DataPaths};
use mmpm_platform::{ProcessRunner, Prompter};
use mmpm_types::{Outcome, Package, PackageRecord, HOST_APP_NAME, MANAGER_NAME, NA};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use store::Stored;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// How long a scraped catalog stays fresh.
pub const CACHE_LIFETIME_HOURS: i64 = 12;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize catalog data: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scrape(#[from] ScrapeError),
    #[error("Catalog task failed: {0}")]
    Task(String),
}

/// The dashboard application packages are installed into.
pub trait HostApplication: Send + Sync {
    /// Whether upstream has commits not yet pulled.
    fn check_for_upgrade(&self) -> bool;

    fn upgrade(&self) -> Outcome;
}

/// Everything the catalog needs from the outside world.
#[derive(Clone)]
pub struct CatalogContext {
    pub paths: DataPaths,
    pub config: Arc<dyn ConfigAccessor>,
    pub runner: Arc<dyn ProcessRunner>,
    pub prompter: Arc<dyn Prompter>,
    pub scraper: Arc<dyn Scraper>,
}

impl CatalogContext {
    pub fn lifecycle(&self) -> PackageLifecycle<'_> {
        PackageLifecycle::new(self.config.as_ref(), self.runner.as_ref(), self.prompter.as_ref())
    }

    fn confirm(&self, question: &str, assume_yes: bool) -> bool {
        assume_yes || self.prompter.confirm(question)
    }
}

/// `{"last-update": ..., "expiration": ...}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Expiration {
    #[serde(rename = "last-update")]
    last_update: DateTime<Utc>,
    expiration: DateTime<Utc>,
}

impl Expiration {
    fn starting_now() -> Self {
        let last_update = Utc::now();
        Self {
            last_update,
            expiration: last_update + Duration::hours(CACHE_LIFETIME_HOURS),
        }
    }
}

/// Summary shown by `db --info` and `GET /api/db/info`.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogInfo {
    pub last_update: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    pub categories: usize,
    pub packages: usize,
}

/// A package and what happened to it.
#[derive(Debug, Clone)]
pub struct OperationResult {
    pub package: Package,
    pub outcome: Outcome,
}

/// Everything `upgrade` did.
#[derive(Debug, Clone, Default)]
pub struct UpgradeReport {
    pub packages: Vec<OperationResult>,
    /// Outcome for MagicMirror itself, when it was upgradable and selected
    pub host_app: Option<Outcome>,
    /// mmpm has a newer release; upgrading it is left to the user
    pub manager_available: bool,
    /// Selected names that matched nothing upgradable
    pub unmatched: Vec<String>,
}

impl UpgradeReport {
    pub fn failures(&self) -> usize {
        self.packages.iter().filter(|r| r.outcome.is_failure()).count()
            + usize::from(self.host_app.as_ref().is_some_and(Outcome::is_failure))
    }
}

/// The package catalog.
pub struct Catalog {
    ctx: CatalogContext,
    packages: Vec<Package>,
    categories: BTreeSet<String>,
    last_update: Option<DateTime<Utc>>,
    expiration: Option<DateTime<Utc>>,
}

impl Catalog {
    pub fn new(ctx: CatalogContext) -> Self {
        Self {
            ctx,
            packages: Vec::new(),
            categories: BTreeSet::new(),
            last_update: None,
            expiration: None,
        }
    }

    pub fn context(&self) -> &CatalogContext {
        &self.ctx
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Category names, sorted.
    pub fn categories(&self) -> Vec<String> {
        self.categories.iter().cloned().collect()
    }

    pub fn installed(&self) -> Vec<&Package> {
        self.packages.iter().filter(|p| p.is_installed).collect()
    }

    /// Replace the in-memory packages with a fresh scrape.
    ///
    /// Leaves the packages untouched when the scrape fails. Duplicate rows
    /// (same identity) keep their first occurrence.
    pub fn download(&mut self) -> Result<usize, ScrapeError> {
        let scraped = self.ctx.scraper.scrape()?;

        let mut seen = HashSet::new();
        self.packages = scraped.into_iter().filter(|p| seen.insert(p.clone())).collect();

        info!("Retrieved {} packages", self.packages.len());
        Ok(self.packages.len())
    }

    fn read_expiration(&self) -> Option<Expiration> {
        match store::read::<Expiration>(&self.ctx.paths.expiration_file()) {
            Stored::Present(expiration) => Some(expiration),
            _ => None,
        }
    }

    /// Whether the cached catalog must be scraped again.
    pub fn is_expired(&self) -> bool {
        if !store::has_content(&self.ctx.paths.catalog_file()) {
            return true;
        }

        match self.read_expiration() {
            Some(expiration) => Utc::now() > expiration.expiration,
            None => true,
        }
    }

    /// Load the catalog, scraping the wiki when `refresh` is set or the
    /// cache is missing or expired, then merge external packages and
    /// discover what is installed.
    pub fn load(&mut self, refresh: bool) -> Result<(), CatalogError> {
        self.packages.clear();

        let cache_file = self.ctx.paths.catalog_file();
        let expiration = self.read_expiration();
        self.last_update = expiration.map(|e| e.last_update);
        self.expiration = expiration.map(|e| e.expiration);

        if refresh || self.is_expired() {
            match self.download() {
                Ok(0) => warn!("The wiki listed no packages, keeping the existing cache"),
                Ok(_) => self.persist()?,
                Err(e) => error!("{}. Please check your internet connection.", e),
            }
        }

        if self.packages.is_empty() && store::has_content(&cache_file) {
            match store::read::<Vec<PackageRecord>>(&cache_file) {
                Stored::Present(records) => {
                    self.packages = records.into_iter().map(Package::from).collect();
                }
                Stored::Corrupt => warn!("Ignoring the corrupt catalog cache"),
                Stored::Absent => {}
            }
        }

        for package in external::load(&self.ctx.paths.external_packages_file()) {
            if !self.packages.contains(&package) {
                self.packages.push(package);
            }
        }

        self.categories = self.packages.iter().map(|p| p.category.clone()).collect();
        self.discover_installed();

        debug!(
            "Loaded {} packages in {} categories",
            self.packages.len(),
            self.categories.len()
        );
        Ok(())
    }

    fn persist(&mut self) -> Result<(), CatalogError> {
        let records: Vec<PackageRecord> = self.packages.iter().map(Package::to_record).collect();
        store::write(&self.ctx.paths.catalog_file(), &records)?;

        let expiration = Expiration::starting_now();
        store::write(&self.ctx.paths.expiration_file(), &expiration)?;

        self.last_update = Some(expiration.last_update);
        self.expiration = Some(expiration.expiration);
        Ok(())
    }

    /// Mark every package found as a git checkout in the modules directory.
    ///
    /// Returns how many packages are installed.
    pub fn discover_installed(&mut self) -> usize {
        let found = discovery::scan(
            &self.ctx.config.modules_dir(),
            self.ctx.runner.as_ref(),
            self.ctx.config.process_timeout(),
        );
        discovery::mark_installed(&mut self.packages, &found)
    }

    /// Find packages.
    ///
    /// With `title_only`, titles must match exactly. Otherwise a query that
    /// names a category (case-sensitively) returns that category, and any
    /// other query is a substring match on description, title or author.
    pub fn search(&self, query: &str, case_sensitive: bool, title_only: bool) -> Vec<&Package> {
        let query = query.trim();
        let fold = |s: &str| if case_sensitive { s.to_string() } else { s.to_lowercase() };
        let needle = fold(query);

        if title_only {
            return self.packages.iter().filter(|p| fold(p.title()) == needle).collect();
        }

        if self.categories.contains(query) {
            return self.packages.iter().filter(|p| p.category == query).collect();
        }

        self.packages
            .iter()
            .filter(|p| {
                fold(&p.description).contains(&needle)
                    || fold(p.title()).contains(&needle)
                    || fold(p.author()).contains(&needle)
            })
            .collect()
    }

    /// Map names to packages by exact title, returning the names that matched nothing.
    pub fn resolve(&self, titles: &[String]) -> (Vec<Package>, Vec<String>) {
        let mut matches = Vec::new();
        let mut unmatched = Vec::new();

        for title in titles {
            let found: Vec<_> = self
                .packages
                .iter()
                .filter(|p| p.title() == title)
                .cloned()
                .collect();
            if found.is_empty() {
                unmatched.push(title.clone());
            } else {
                matches.extend(found);
            }
        }

        (matches, unmatched)
    }

    /// The catalog's copy of `package`, if it has one.
    fn current(&self, package: &Package) -> Option<Package> {
        self.packages.iter().find(|p| *p == package).cloned()
    }

    fn unknown(package: &Package) -> OperationResult {
        warn!("{} is not in the catalog", package.title());
        OperationResult {
            package: package.clone(),
            outcome: Outcome::skipped("unknown package"),
        }
    }

    /// Install each package, then rediscover install state.
    ///
    /// Only the catalog's own copy of a package is acted on; anything else is skipped.
    pub fn install(&mut self, packages: &[Package], assume_yes: bool) -> Vec<OperationResult> {
        let results = packages
            .iter()
            .map(|supplied| match self.current(supplied) {
                Some(package) => {
                    let outcome = self.ctx.lifecycle().install(&package, assume_yes);
                    OperationResult { package, outcome }
                }
                None => Self::unknown(supplied),
            })
            .collect();

        self.discover_installed();
        results
    }

    /// Remove each package, then rediscover install state.
    pub fn remove(&mut self, packages: &[Package], assume_yes: bool) -> Vec<OperationResult> {
        let results = packages
            .iter()
            .map(|supplied| match self.current(supplied) {
                Some(package) => {
                    let outcome = self.ctx.lifecycle().remove(&package, assume_yes);
                    OperationResult { package, outcome }
                }
                None => Self::unknown(supplied),
            })
            .collect();

        self.discover_installed();
        results
    }

    /// Check every installed package for upstream changes and rewrite the ledger.
    ///
    /// Returns the number of pending upgrades, counting mmpm and MagicMirror.
    pub fn update(
        &mut self,
        can_upgrade_manager: bool,
        can_upgrade_host_app: bool,
    ) -> Result<usize, CatalogError> {
        let lifecycle = self.ctx.lifecycle();
        let mut upgradable = Vec::new();

        for package in self.packages.iter_mut().filter(|p| p.is_installed) {
            info!("Retrieving {} [{}]", package.repository(), package.title());
            lifecycle.update(package);

            if package.is_upgradable {
                upgradable.push(package.to_record());
            }
        }

        let ledger = UpgradeLedger {
            manager: can_upgrade_manager,
            host_app: can_upgrade_host_app,
            packages: upgradable,
        };
        ledger.write(&self.ctx.paths.upgrades_file())?;

        Ok(ledger.count())
    }

    /// The upgrade ledger, reset on disk if it was corrupt.
    pub fn upgradable(&self) -> Result<UpgradeLedger, CatalogError> {
        UpgradeLedger::read(&self.ctx.paths.upgrades_file())
    }

    /// All packages with `is_upgradable` taken from the ledger.
    pub fn packages_with_upgrades(&self) -> Result<Vec<Package>, CatalogError> {
        let ledger = self.upgradable()?;

        Ok(self
            .packages
            .iter()
            .cloned()
            .map(|mut p| {
                p.is_upgradable = ledger.contains(&p);
                p
            })
            .collect())
    }

    /// Upgrade what the ledger lists, restricted to `selection` unless it is empty.
    ///
    /// Whatever succeeded is dropped from the ledger, which is then rewritten.
    pub fn upgrade(
        &mut self,
        selection: &[String],
        assume_yes: bool,
        host: Option<&dyn HostApplication>,
    ) -> Result<UpgradeReport, CatalogError> {
        let mut ledger = self.upgradable()?;
        let mut report = UpgradeReport::default();
        let selected = |name: &str| selection.is_empty() || selection.iter().any(|s| s == name);

        for record in ledger.packages.clone() {
            let listed = Package::from(record);
            if !selected(listed.title()) {
                continue;
            }
            let Some(package) = self.current(&listed) else {
                report.packages.push(Self::unknown(&listed));
                continue;
            };

            let question = format!("Upgrade {}?", package.title());
            let outcome = if self.ctx.confirm(&question, assume_yes) {
                self.ctx.lifecycle().upgrade(&package)
            } else {
                Outcome::skipped("declined")
            };

            if outcome.is_success() {
                ledger.remove(&package);
            }
            report.packages.push(OperationResult { package, outcome });
        }

        if ledger.host_app && selected(HOST_APP_NAME) {
            match host {
                Some(host) => {
                    let question = format!("Upgrade {}?", HOST_APP_NAME);
                    let outcome = if self.ctx.confirm(&question, assume_yes) {
                        host.upgrade()
                    } else {
                        Outcome::skipped("declined")
                    };
                    ledger.host_app = !outcome.is_success();
                    report.host_app = Some(outcome);
                }
                None => warn!("No {} controller available", HOST_APP_NAME),
            }
        }

        if ledger.manager && selected(MANAGER_NAME) {
            info!("A new version of {} is available", MANAGER_NAME);
            report.manager_available = true;
        }

        report.unmatched = selection
            .iter()
            .filter(|name| {
                name.as_str() != MANAGER_NAME
                    && name.as_str() != HOST_APP_NAME
                    && !report.packages.iter().any(|r| r.package.title() == name.as_str())
            })
            .cloned()
            .collect();

        ledger.write(&self.ctx.paths.upgrades_file())?;
        Ok(report)
    }

    /// Prompt for whatever was not supplied, or `None` if still empty.
    fn require(&self, value: Option<String>, question: &str) -> Option<String> {
        value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.ctx.prompter.ask(question))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Register a package that is not listed on the wiki.
    ///
    /// Missing fields are asked for. Duplicate titles are accepted with a
    /// warning.
    pub fn add_external(
        &mut self,
        title: Option<String>,
        author: Option<String>,
        repository: Option<String>,
        description: Option<String>,
    ) -> Outcome {
        let Some(title) = self.require(title, "Title: ") else {
            return Outcome::failure("A title is required");
        };
        let Some(author) = self.require(author, "Author: ") else {
            return Outcome::failure("An author is required");
        };
        let Some(repository) = self.require(repository, "Repository: ") else {
            return Outcome::failure("A repository is required");
        };
        let description = self
            .require(description, "Description: ")
            .unwrap_or_else(|| NA.to_string());

        let package = Package::external(title, author, repository, description);
        let path = self.ctx.paths.external_packages_file();
        let mut stored = external::load(&path);

        if stored.iter().any(|p| p.title().eq_ignore_ascii_case(package.title())) {
            warn!("An external package named {} is already registered", package.title());
        }

        stored.push(package.clone());

        if let Err(e) = external::save(&path, &stored) {
            error!("Failed to save external package: {}", e);
            return Outcome::failure(e.to_string());
        }

        info!("Added {} to {}", package.title(), package.category);
        self.categories.insert(package.category.clone());
        if !self.packages.contains(&package) {
            self.packages.push(package);
        }
        Outcome::Success
    }

    /// Remove external packages by exact title.
    ///
    /// Returns `false` when there are no external packages or none matched.
    pub fn remove_external(
        &mut self,
        titles: &[String],
        assume_yes: bool,
    ) -> Result<bool, CatalogError> {
        let path = self.ctx.paths.external_packages_file();
        let stored = external::load(&path);

        if stored.is_empty() {
            error!("No external packages found");
            return Ok(false);
        }

        let (removed, kept): (Vec<Package>, Vec<Package>) = stored.into_iter().partition(|p| {
            let question = format!("Remove {} from the external packages?", p.title());
            titles.iter().any(|t| t == p.title()) && self.ctx.confirm(&question, assume_yes)
        });

        if removed.is_empty() {
            warn!("No matching external packages");
            return Ok(false);
        }

        external::save(&path, &kept)?;
        self.packages.retain(|p| !(p.is_external && removed.contains(p)));

        for package in &removed {
            info!("Removed {} from the external packages", package.title());
        }
        Ok(true)
    }

    pub fn info(&self) -> CatalogInfo {
        CatalogInfo {
            last_update: self.last_update,
            expiration: self.expiration,
            categories: self.categories.len(),
            packages: self.packages.len(),
        }
    }

    /// Every package with its install state.
    pub fn dump(&self) -> Vec<PackageRecord> {
        self.packages.iter().map(Package::to_full_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmpm_config::StaticConfig;
    use mmpm_platform::testing::{RecordingRunner, ScriptedPrompter};
    use mmpm_platform::ProcessOutput;
    use mmpm_types::EXTERNAL_PACKAGES;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct StubScraper {
        packages: Vec<Package>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl Scraper for StubScraper {
        fn scrape(&self) -> Result<Vec<Package>, ScrapeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ScrapeError::Layout("stub".into()));
            }
            Ok(self.packages.clone())
        }
    }

    fn wiki() -> Vec<Package> {
        vec![
            Package::new(
                "MMM-Forecast",
                "alice",
                "https://github.com/alice/MMM-Forecast",
                "Simple forecast",
                "Weather",
            ),
            Package::new(
                "MMM-Radar",
                "bob",
                "https://github.com/bob/MMM-Radar",
                "Rain radar",
                "weather tools",
            ),
            Package::new(
                "MMM-Clock",
                "SimpleSoft",
                "https://github.com/ss/MMM-Clock",
                "A clock",
                "Utility",
            ),
            Package::new(
                "MMM-News",
                "carol",
                "https://github.com/carol/MMM-News",
                "Headlines",
                "News",
            ),
        ]
    }

    struct Harness {
        tmp: TempDir,
        scraper: Arc<StubScraper>,
        runner: Arc<RecordingRunner>,
        prompter: Arc<ScriptedPrompter>,
    }

    impl Harness {
        fn new(packages: Vec<Package>) -> Self {
            Self::with(packages, false, ScriptedPrompter::yes())
        }

        fn with(packages: Vec<Package>, fail: bool, prompter: ScriptedPrompter) -> Self {
            let tmp = TempDir::new().unwrap();
            fs::create_dir_all(tmp.path().join("MagicMirror").join("modules")).unwrap();
            Self {
                tmp,
                scraper: Arc::new(StubScraper {
                    packages,
                    fail,
                    calls: AtomicUsize::new(0),
                }),
                runner: Arc::new(RecordingRunner::new()),
                prompter: Arc::new(prompter),
            }
        }

        fn modules(&self) -> PathBuf {
            self.tmp.path().join("MagicMirror").join("modules")
        }

        fn paths(&self) -> DataPaths {
            DataPaths::open_at(self.tmp.path().join("config")).unwrap()
        }

        fn catalog(&self) -> Catalog {
            Catalog::new(CatalogContext {
                paths: self.paths(),
                config: Arc::new(StaticConfig::new(self.tmp.path().join("MagicMirror"))),
                runner: self.runner.clone(),
                prompter: self.prompter.clone(),
                scraper: self.scraper.clone(),
            })
        }

        /// A git checkout whose remote is `repository`.
        fn checkout(&self, dir: &str, repository: &str) {
            fs::create_dir_all(self.modules().join(dir).join(".git")).unwrap();
            self.runner
                .on("git", Some("config"), ProcessOutput::new(0, format!("{}\n", repository), ""));
        }

        fn scrapes(&self) -> usize {
            self.scraper.calls.load(Ordering::SeqCst)
        }
    }

    fn titles(packages: &[&Package]) -> Vec<String> {
        packages.iter().map(|p| p.title().to_string()).collect()
    }

    #[test]
    fn test_load_sets_twelve_hour_expiration() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let info = catalog.info();
        assert_eq!(info.packages, 4);
        assert_eq!(info.categories, 4);
        assert_eq!(
            info.expiration.unwrap() - info.last_update.unwrap(),
            Duration::hours(CACHE_LIFETIME_HOURS)
        );

        let raw = fs::read_to_string(h.paths().expiration_file()).unwrap();
        let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let last: DateTime<Utc> = serde_json::from_value(on_disk["last-update"].clone()).unwrap();
        let exp: DateTime<Utc> = serde_json::from_value(on_disk["expiration"].clone()).unwrap();
        assert_eq!(exp - last, Duration::hours(12));
    }

    #[test]
    fn test_fresh_cache_is_reused() {
        let h = Harness::new(wiki());
        h.catalog().load(false).unwrap();

        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert_eq!(h.scrapes(), 1);
        assert_eq!(catalog.packages().len(), 4);

        catalog.load(true).unwrap();
        assert_eq!(h.scrapes(), 2);
    }

    #[test]
    fn test_expired_cache_is_refreshed() {
        let h = Harness::new(wiki());
        h.catalog().load(false).unwrap();

        let past = Utc::now() - Duration::hours(13);
        let stale = Expiration {
            last_update: past,
            expiration: past + Duration::hours(CACHE_LIFETIME_HOURS),
        };
        store::write(&h.paths().expiration_file(), &stale).unwrap();

        let catalog = h.catalog();
        assert!(catalog.is_expired());
        h.catalog().load(false).unwrap();
        assert_eq!(h.scrapes(), 2);
    }

    #[test]
    fn test_empty_scrape_writes_nothing() {
        let h = Harness::new(Vec::new());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert!(catalog.packages().is_empty());
        assert!(!store::has_content(&h.paths().catalog_file()));
        assert!(!store::has_content(&h.paths().expiration_file()));
    }

    #[test]
    fn test_failed_scrape_falls_back_to_cache() {
        let h = Harness::new(wiki());
        h.catalog().load(false).unwrap();

        let offline = Harness::with(Vec::new(), true, ScriptedPrompter::yes());
        let paths = h.paths();
        let mut catalog = Catalog::new(CatalogContext {
            paths,
            config: Arc::new(StaticConfig::new(h.tmp.path().join("MagicMirror"))),
            runner: offline.runner.clone(),
            prompter: offline.prompter.clone(),
            scraper: offline.scraper.clone(),
        });

        catalog.load(true).unwrap();
        assert_eq!(catalog.packages().len(), 4);
    }

    #[test]
    fn test_corrupt_cache_is_no_data() {
        let h = Harness::new(wiki());
        h.catalog().load(false).unwrap();
        fs::write(h.paths().catalog_file(), "[{\"title\": ").unwrap();

        let mut catalog = h.catalog();
        catalog.load(false).unwrap();
        assert!(catalog.packages().is_empty());
    }

    #[test]
    fn test_search_category_is_exact() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert_eq!(titles(&catalog.search("Weather", false, false)), vec!["MMM-Forecast"]);
        assert_eq!(titles(&catalog.search("weather tools", true, false)), vec!["MMM-Radar"]);
    }

    #[test]
    fn test_search_falls_back_to_substring() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let mut found = titles(&catalog.search("simple", false, false));
        found.sort();
        assert_eq!(found, vec!["MMM-Clock", "MMM-Forecast"]);

        assert!(catalog.search("simple", true, false).is_empty());
        assert!(catalog.search("nothing like this", false, false).is_empty());
    }

    #[test]
    fn test_search_title_only_is_exact() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert_eq!(titles(&catalog.search("mmm-clock", false, true)), vec!["MMM-Clock"]);
        assert!(catalog.search("mmm-clock", true, true).is_empty());
        assert!(catalog.search("MMM-Clo", false, true).is_empty());
    }

    #[test]
    fn test_discovery_after_load_is_idempotent() {
        let h = Harness::new(wiki());
        h.checkout("MMM-Clock", "https://github.com/ss/MMM-Clock.git");
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let first: Vec<_> = catalog.packages().iter().map(|p| p.is_installed).collect();
        assert_eq!(catalog.discover_installed(), 1);
        let second: Vec<_> = catalog.packages().iter().map(|p| p.is_installed).collect();

        assert_eq!(first, second);
        assert_eq!(titles(&catalog.installed()), vec!["MMM-Clock"]);
    }

    #[test]
    fn test_update_records_upgradable_package() {
        let h = Harness::new(wiki());
        h.checkout("MMM-Clock", "https://github.com/ss/MMM-Clock.git");
        h.runner.on(
            "git",
            Some("fetch"),
            ProcessOutput::new(0, "From github.com:ss/MMM-Clock", ""),
        );

        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert_eq!(catalog.update(true, false).unwrap(), 2);

        let ledger = catalog.upgradable().unwrap();
        assert!(ledger.manager);
        assert!(!ledger.host_app);
        assert_eq!(ledger.packages.len(), 1);
        assert_eq!(ledger.packages[0].title, "MMM-Clock");

        let listed = catalog.packages_with_upgrades().unwrap();
        assert_eq!(listed.iter().filter(|p| p.is_upgradable).count(), 1);
    }

    #[test]
    fn test_upgrade_rewrites_ledger_with_residual() {
        struct Host;
        impl HostApplication for Host {
            fn check_for_upgrade(&self) -> bool {
                true
            }
            fn upgrade(&self) -> Outcome {
                Outcome::failure("git pull failed")
            }
        }

        let h = Harness::new(wiki());
        h.checkout("MMM-Clock", "https://github.com/ss/MMM-Clock.git");
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let clock = catalog.resolve(&["MMM-Clock".to_string()]).0.remove(0);
        let news = catalog.resolve(&["MMM-News".to_string()]).0.remove(0);
        UpgradeLedger {
            manager: true,
            host_app: true,
            packages: vec![clock.to_record(), news.to_record()],
        }
        .write(&h.paths().upgrades_file())
        .unwrap();
        h.runner.on("git", Some("pull"), ProcessOutput::new(0, "Already up to date.", ""));

        let selection = vec![
            "MMM-Clock".to_string(),
            "MagicMirror".to_string(),
            "MMM-Nope".to_string(),
        ];
        let report = catalog.upgrade(&selection, true, Some(&Host)).unwrap();

        assert_eq!(report.packages.len(), 1);
        assert!(report.packages[0].outcome.is_success());
        assert_eq!(report.host_app, Some(Outcome::failure("git pull failed")));
        assert!(!report.manager_available);
        assert_eq!(report.unmatched, vec!["MMM-Nope"]);
        assert_eq!(report.failures(), 1);

        let residual = catalog.upgradable().unwrap();
        assert!(residual.manager);
        assert!(residual.host_app);
        assert_eq!(residual.packages, vec![news.to_record()]);
    }

    #[test]
    fn test_resolve_is_case_sensitive() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let (found, unmatched) = catalog.resolve(&["MMM-News".to_string(), "mmm-news".to_string()]);
        assert_eq!(found.len(), 1);
        assert_eq!(unmatched, vec!["mmm-news"]);
    }

    #[test]
    fn test_add_external_prompts_and_allows_duplicates() {
        let prompter =
            ScriptedPrompter::yes().with_answers(["me", "https://example.com/me/MMM-Mine"]);
        let h = Harness::with(wiki(), false, prompter);
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let outcome =
            catalog.add_external(Some("MMM-Mine".into()), None, None, Some("mine".into()));
        assert_eq!(outcome, Outcome::Success);
        assert_eq!(h.prompter.asked(), vec!["Author: ", "Repository: "]);

        let again = catalog.add_external(
            Some("MMM-Mine".into()),
            Some("someone else".into()),
            Some("https://example.com/else/MMM-Mine".into()),
            Some("fork".into()),
        );
        assert_eq!(again, Outcome::Success);
        assert_eq!(external::load(&h.paths().external_packages_file()).len(), 2);

        let mut reloaded = h.catalog();
        reloaded.load(false).unwrap();
        assert_eq!(reloaded.search(EXTERNAL_PACKAGES, true, false).len(), 2);
        assert!(reloaded.search(EXTERNAL_PACKAGES, true, false).iter().all(|p| p.is_external));
    }

    #[test]
    fn test_add_external_without_answers_fails() {
        let h = Harness::with(wiki(), false, ScriptedPrompter::no());
        let mut catalog = h.catalog();

        let outcome = catalog.add_external(None, None, None, None);
        assert_eq!(outcome, Outcome::failure("A title is required"));
        assert!(!store::has_content(&h.paths().external_packages_file()));
    }

    #[test]
    fn test_remove_external() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        assert!(!catalog.remove_external(&["MMM-Mine".to_string()], true).unwrap());

        catalog.add_external(
            Some("MMM-Mine".into()),
            Some("me".into()),
            Some("https://example.com/me/MMM-Mine".into()),
            None,
        );
        assert!(!catalog.remove_external(&["MMM-Other".to_string()], true).unwrap());
        assert!(catalog.remove_external(&["MMM-Mine".to_string()], true).unwrap());

        assert!(external::load(&h.paths().external_packages_file()).is_empty());
        assert!(catalog.packages().iter().all(|p| !p.is_external));
    }

    #[test]
    fn test_dump_includes_install_state() {
        let h = Harness::new(wiki());
        h.checkout("MMM-News", "https://github.com/carol/MMM-News");
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let dump = catalog.dump();
        let news = dump.iter().find(|r| r.title == "MMM-News").unwrap();
        assert_eq!(news.is_installed, Some(true));
        assert_eq!(news.directory.as_deref(), Some("MMM-News"));
    }

    #[test]
    fn test_packages_outside_catalog_are_skipped() {
        let h = Harness::new(wiki());
        let config = h.tmp.path().join("MagicMirror").join("config");
        fs::create_dir_all(&config).unwrap();
        fs::write(config.join("config.js"), "module.exports = {};").unwrap();
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let mut forged =
            Package::new("anything", "a", "https://x/y", "", "").with_directory("../config");
        forged.is_installed = true;

        let removed = catalog.remove(std::slice::from_ref(&forged), true);
        assert_eq!(removed[0].outcome, Outcome::skipped("unknown package"));
        assert!(config.join("config.js").exists());

        let installed = catalog.install(&[forged], true);
        assert_eq!(installed[0].outcome, Outcome::skipped("unknown package"));
        assert!(!h.runner.command_lines().iter().any(|l| l.starts_with("git clone")));
    }

    #[test]
    fn test_catalog_copy_wins_over_supplied_fields() {
        let h = Harness::new(wiki());
        let config = h.tmp.path().join("MagicMirror").join("config");
        fs::create_dir_all(&config).unwrap();
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();

        let mut clock =
            Package::new("MMM-Clock", "SimpleSoft", "https://github.com/ss/MMM-Clock", "", "")
                .with_directory("../config");
        clock.is_installed = true;

        let results = catalog.remove(&[clock], true);
        assert_eq!(results[0].outcome, Outcome::skipped("MMM-Clock is not installed"));
        assert_eq!(results[0].package.directory, PathBuf::new());
        assert!(config.is_dir());
    }

    #[test]
    fn test_removed_checkout_is_no_longer_installed() {
        let h = Harness::new(wiki());
        h.checkout("MMM-Clock", "https://github.com/ss/MMM-Clock.git");
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();
        assert_eq!(titles(&catalog.installed()), vec!["MMM-Clock"]);

        fs::remove_dir_all(h.modules().join("MMM-Clock")).unwrap();

        assert_eq!(catalog.discover_installed(), 0);
        assert!(catalog.installed().is_empty());
        let clock = catalog.resolve(&["MMM-Clock".to_string()]).0.remove(0);
        assert!(!clock.is_installed);
        assert_eq!(clock.directory, PathBuf::new());
    }

    #[test]
    fn test_add_external_reports_write_failure() {
        let h = Harness::new(wiki());
        let mut catalog = h.catalog();
        catalog.load(false).unwrap();
        fs::create_dir_all(h.paths().external_packages_file().join("occupied")).unwrap();

        let outcome = catalog.add_external(
            Some("MMM-Mine".into()),
            Some("me".into()),
            Some("https://example.com/me/MMM-Mine".into()),
            Some("mine".into()),
        );

        assert!(matches!(outcome, Outcome::Failure(_)));
        assert!(catalog.search(EXTERNAL_PACKAGES, true, false).is_empty());
    }
}
