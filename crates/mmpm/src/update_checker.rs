//! Checks GitHub for a newer mmpm release.

use semver::Version;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::debug;

const GITHUB_REPO: &str = "Bee-Mar/mmpm";

/// GitHub release response (minimal).
#[derive(Debug, Deserialize)]
struct GitHubRelease {
    tag_name: String,
}

/// The running version of mmpm.
pub fn current_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

fn should_check() -> bool {
    env::var_os("CI").is_none() && env::var_os("MMPM_NO_UPDATE_CHECK").is_none()
}

/// Fetch the latest released version from GitHub.
async fn fetch_latest_version() -> Option<String> {
    let url = format!("https://api.github.com/repos/{}/releases/latest", GITHUB_REPO);

    let client = reqwest::Client::builder()
        .user_agent("mmpm-update-checker")
        .timeout(Duration::from_secs(5))
        .build()
        .ok()?;

    let response = client.get(&url).send().await.ok()?;

    if !response.status().is_success() {
        debug!("Release lookup returned {}", response.status());
        return None;
    }

    let release: GitHubRelease = response.json().await.ok()?;
    Some(release.tag_name.trim_start_matches('v').to_string())
}

/// Whether a newer mmpm has been released. Any failure answers `false`.
pub async fn manager_upgradable() -> bool {
    if !should_check() {
        return false;
    }

    match fetch_latest_version().await {
        Some(latest) => is_newer(current_version(), &latest),
        None => false,
    }
}

fn is_newer(current: &str, latest: &str) -> bool {
    match (Version::parse(current), Version::parse(latest)) {
        (Ok(current), Ok(latest)) => latest > current,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("4.0.0", "4.0.1"));
        assert!(is_newer("4.0.0", "4.1.0-beta.1"));
        assert!(!is_newer("4.0.0", "4.0.0"));
        assert!(!is_newer("4.1.0", "4.0.9"));
    }

    #[test]
    fn test_unparseable_versions_are_not_newer() {
        assert!(!is_newer("4.0.0", "latest"));
        assert!(!is_newer("dev", "4.0.0"));
    }

    #[test]
    fn test_current_version_is_semver() {
        assert!(Version::parse(current_version()).is_ok());
    }
}
