//! Core CLI command implementations.

use super::ui::{self, dim, num, pkg, separator};
use super::Session;
use crate::{remote, update_checker};
use miette::{IntoDiagnostic, Result};
use mmpm_catalog::{CatalogInfo, HostApplication, OperationResult, UpgradeReport};
use mmpm_diagnostics::MmpmError;
use mmpm_platform::require_tool;
use mmpm_types::{Outcome, Package, HOST_APP_NAME, MANAGER_NAME};

/// Which packages `mmpm list` shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Installed,
    ExcludeInstalled,
    Categories,
    Upgradable,
}

fn ensure_tool(tool: &str) -> Result<()> {
    require_tool(tool).map_err(|_| MmpmError::missing_tool(tool))?;
    Ok(())
}

fn ensure_modules_dir(session: &Session) -> Result<()> {
    use mmpm_config::ConfigAccessor;

    let modules_dir = session.env.modules_dir();
    if !modules_dir.is_dir() {
        return Err(MmpmError::modules_dir_missing(
            modules_dir.display().to_string(),
            session.paths.env_file().display().to_string(),
        )
        .into());
    }
    Ok(())
}

/// Load the catalog and refuse to continue without packages.
async fn load_catalog(session: &Session) -> Result<()> {
    session.load(false).await?;

    if session.with_catalog(|catalog| catalog.is_empty()).await? {
        return Err(MmpmError::EmptyCatalog.into());
    }
    Ok(())
}

/// Map names to packages, failing if none of them matched.
async fn resolve(session: &Session, names: &[String]) -> Result<Vec<Package>> {
    let names = names.to_vec();
    let (matches, unmatched) = session.with_catalog(move |catalog| catalog.resolve(&names)).await?;

    if matches.is_empty() {
        return Err(MmpmError::unknown_packages(&unmatched).into());
    }

    for name in &unmatched {
        ui::warn(format!("Unable to match '{}' to a package", name));
    }
    Ok(matches)
}

fn print_outcome(verb: &str, title: &str, outcome: &Outcome) {
    match outcome {
        Outcome::Success => ui::success(format!("{} {}", verb, pkg(title))),
        Outcome::Skipped(reason) => ui::warn(format!("Skipped {}: {}", pkg(title), reason)),
        Outcome::Failure(message) => ui::error(format!("{} failed: {}", pkg(title), message)),
    }
}

fn finish(failures: usize) -> Result<()> {
    if failures > 0 {
        return Err(MmpmError::OperationsFailed { count: failures }.into());
    }
    Ok(())
}

fn report(verb: &str, results: &[OperationResult]) -> Result<()> {
    for result in results {
        print_outcome(verb, result.package.title(), &result.outcome);
    }
    finish(results.iter().filter(|r| r.outcome.is_failure()).count())
}

/// Install packages by title.
pub async fn install(session: &Session, names: &[String], assume_yes: bool) -> Result<()> {
    ensure_tool("git")?;
    ensure_modules_dir(session)?;
    load_catalog(session).await?;

    let packages = resolve(session, names).await?;
    let results = session
        .with_catalog(move |catalog| catalog.install(&packages, assume_yes))
        .await?;

    report("Installed", &results)
}

/// Remove installed packages by title.
pub async fn remove(session: &Session, names: &[String], assume_yes: bool) -> Result<()> {
    ensure_modules_dir(session)?;
    load_catalog(session).await?;

    let packages = resolve(session, names).await?;
    let results = session
        .with_catalog(move |catalog| catalog.remove(&packages, assume_yes))
        .await?;

    report("Removed", &results)
}

pub async fn search(
    session: &Session,
    query: &str,
    case_sensitive: bool,
    title_only: bool,
) -> Result<()> {
    load_catalog(session).await?;

    let query = query.to_string();
    let matches = session
        .with_catalog(move |catalog| {
            catalog
                .search(&query, case_sensitive, title_only)
                .into_iter()
                .cloned()
                .collect::<Vec<_>>()
        })
        .await?;

    if matches.is_empty() {
        ui::warn("No matching packages");
        return Ok(());
    }

    for package in &matches {
        ui::package_line(package, title_only);
    }
    Ok(())
}

/// Print every field of the named packages, with repository statistics when `fetch_remote`.
pub async fn show(session: &Session, names: &[String], fetch_remote: bool) -> Result<()> {
    load_catalog(session).await?;

    let client = fetch_remote.then(remote::client).transpose().into_diagnostic()?;

    for (i, package) in resolve(session, names).await?.iter().enumerate() {
        if i > 0 {
            println!();
        }
        ui::package_details(package);

        if let Some(client) = &client {
            match remote::fetch(client, package.repository()).await {
                Ok(details) => ui::remote_details(&details),
                Err(e) => ui::warn(format!(
                    "Unable to retrieve details for {}: {}",
                    package.title(),
                    e
                )),
            }
        }
    }
    Ok(())
}

pub async fn list(session: &Session, filter: ListFilter, title_only: bool) -> Result<()> {
    load_catalog(session).await?;

    match filter {
        ListFilter::Categories => {
            let categories = session.with_catalog(|catalog| catalog.categories()).await?;
            for category in categories {
                println!("{}", category);
            }
        }
        ListFilter::Upgradable => {
            let ledger = session
                .with_catalog(|catalog| catalog.upgradable())
                .await?
                .into_diagnostic()?;

            if ledger.is_empty() {
                ui::info("No upgrades available");
                return Ok(());
            }

            if ledger.manager {
                println!("{}", pkg(MANAGER_NAME));
            }
            if ledger.host_app {
                println!("{}", pkg(HOST_APP_NAME));
            }
            for record in ledger.packages {
                ui::package_line(&Package::from(record), title_only);
            }
        }
        ListFilter::All | ListFilter::Installed | ListFilter::ExcludeInstalled => {
            let packages = session
                .with_catalog(move |catalog| {
                    catalog
                        .packages()
                        .iter()
                        .filter(|p| match filter {
                            ListFilter::Installed => p.is_installed,
                            ListFilter::ExcludeInstalled => !p.is_installed,
                            _ => true,
                        })
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .await?;

            for package in &packages {
                ui::package_line(package, title_only);
            }
        }
    }

    Ok(())
}

/// Check mmpm, MagicMirror and every installed package for upgrades.
pub async fn update(session: &Session) -> Result<()> {
    ensure_tool("git")?;
    load_catalog(session).await?;

    let manager = update_checker::manager_upgradable().await;
    let host = session.host();

    let count = session
        .with_catalog(move |catalog| {
            let host_app = host.check_for_upgrade();
            catalog.update(manager, host_app)
        })
        .await?
        .into_diagnostic()?;

    match count {
        0 => ui::success("Everything is up to date"),
        n => {
            ui::info(format!("{} upgrade(s) available", num(n)));
            ui::hint("Run `mmpm list --upgradable` for details, then `mmpm upgrade`");
        }
    }
    Ok(())
}

fn print_upgrade_report(report: &UpgradeReport) -> Result<()> {
    for result in &report.packages {
        print_outcome("Upgraded", result.package.title(), &result.outcome);
    }

    if let Some(outcome) = &report.host_app {
        print_outcome("Upgraded", HOST_APP_NAME, outcome);
    }

    if report.manager_available {
        ui::info(format!("A new version of {} is available", pkg(MANAGER_NAME)));
        ui::hint("Upgrade it with the tool you installed it with, e.g. `cargo install mmpm`");
    }

    for name in &report.unmatched {
        ui::warn(format!("{} has no upgrade available", pkg(name)));
    }

    finish(report.failures())
}

/// Apply pending upgrades, all of them when `names` is empty.
pub async fn upgrade(session: &Session, names: &[String], assume_yes: bool) -> Result<()> {
    ensure_tool("git")?;
    load_catalog(session).await?;

    let names = names.to_vec();
    let host = session.host();

    let report = session
        .with_catalog(move |catalog| {
            let host: &dyn HostApplication = &host;
            catalog.upgrade(&names, assume_yes, Some(host))
        })
        .await?
        .into_diagnostic()?;

    if report.packages.is_empty() && report.host_app.is_none() && !report.manager_available {
        ui::info("No upgrades available");
    }

    print_upgrade_report(&report)
}

fn print_info(info: &CatalogInfo) {
    let timestamp = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };

    ui::header("Database");
    println!("  {:<14} {}", dim("Last update"), timestamp(info.last_update));
    println!("  {:<14} {}", dim("Expiration"), timestamp(info.expiration));
    println!("  {:<14} {}", dim("Categories"), num(info.categories));
    println!("  {:<14} {}", dim("Packages"), num(info.packages));
}

/// `mmpm db`: refresh the cache, print its metadata, or dump it as JSON.
pub async fn db(session: &Session, refresh: bool, info: bool, dump: bool) -> Result<()> {
    session.load(refresh).await?;

    if refresh {
        let count = session.with_catalog(|catalog| catalog.packages().len()).await?;
        ui::success(format!("Database refreshed with {} packages", num(count)));
    }

    if info {
        print_info(&session.with_catalog(|catalog| catalog.info()).await?);
    }

    if dump {
        let records = session.with_catalog(|catalog| catalog.dump()).await?;
        println!("{}", serde_json::to_string_pretty(&records).into_diagnostic()?);
    }

    Ok(())
}

/// Register a package that is not on the wiki.
pub async fn mm_pkg_add(
    session: &Session,
    title: Option<String>,
    author: Option<String>,
    repository: Option<String>,
    description: Option<String>,
) -> Result<()> {
    session.load(false).await?;

    let outcome = session
        .with_catalog(move |catalog| catalog.add_external(title, author, repository, description))
        .await?;

    match outcome {
        Outcome::Success => {
            ui::success("Added external package");
            Ok(())
        }
        other => Err(MmpmError::Generic(other.message().unwrap_or("Failed").to_string()).into()),
    }
}

pub async fn mm_pkg_remove(session: &Session, names: &[String], assume_yes: bool) -> Result<()> {
    session.load(false).await?;

    let names_owned = names.to_vec();
    let removed = session
        .with_catalog(move |catalog| catalog.remove_external(&names_owned, assume_yes))
        .await?
        .into_diagnostic()?;

    if !removed {
        return Err(MmpmError::unknown_packages(names).into());
    }

    ui::success("Removed external package(s)");
    Ok(())
}

/// Print the environment file.
pub fn env(session: &Session) -> Result<()> {
    let values = session.env.snapshot();

    ui::header(session.paths.env_file().display());
    for (key, value) in &values {
        let value = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("  {:<40} {}", key, value);
    }
    separator(60);
    ui::hint("Environment variables of the same name override these values");
    Ok(())
}

pub fn version() {
    println!("{} {}", MANAGER_NAME, update_checker::current_version());
}
