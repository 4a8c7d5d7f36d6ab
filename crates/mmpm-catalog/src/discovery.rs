//! Matching git checkouts in the modules directory back to catalog packages.

use mmpm_platform::{CommandSpec, ProcessRunner};
use mmpm_types::{Package, NA};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Find every git checkout directly under `modules_dir`.
///
/// Each checkout becomes a transient package titled after its directory with
/// the remote origin URL as repository. Checkouts whose remote cannot be read
/// are skipped.
pub fn scan(
    modules_dir: &Path,
    runner: &dyn ProcessRunner,
    timeout: Option<Duration>,
) -> Vec<Package> {
    if !modules_dir.is_dir() {
        warn!("{} does not exist", modules_dir.display());
        return Vec::new();
    }

    let checkouts = WalkDir::new(modules_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir() && entry.path().join(".git").exists());

    let mut found = Vec::new();

    for entry in checkouts {
        let name = entry.file_name().to_string_lossy().into_owned();
        let spec = CommandSpec::new("git", ["config", "--get", "remote.origin.url"])
            .cwd(entry.path())
            .timeout(timeout);

        let remote = match runner.run(&spec) {
            Ok(output) if output.success() && !output.stdout.trim().is_empty() => {
                output.stdout.trim().to_string()
            }
            Ok(output) => {
                warn!(
                    "Unable to read the git remote of {}: {}",
                    entry.path().display(),
                    output.stderr.trim()
                );
                continue;
            }
            Err(e) => {
                warn!("Unable to read the git remote of {}: {}", entry.path().display(), e);
                continue;
            }
        };

        debug!("Found {} ({})", name, remote);
        found.push(Package::new(&name, NA, remote, NA, NA).with_directory(&name));
    }

    found
}

/// Set `is_installed` and `directory` on every package matching a checkout.
///
/// A package matches on identity, or failing that on its repository URL
/// alone, since checkouts are titled after their directory. Every other
/// package is marked as not installed and loses any directory from an
/// earlier pass.
pub fn mark_installed(packages: &mut [Package], found: &[Package]) -> usize {
    let mut installed = 0;

    for package in packages.iter_mut() {
        package.is_installed = false;
        package.directory = PathBuf::new();

        let matched = found.iter().find(|f| **f == *package).or_else(|| {
            found
                .iter()
                .find(|f| f.repository().eq_ignore_ascii_case(package.repository()))
        });

        if let Some(checkout) = matched {
            package.is_installed = true;
            package.directory = checkout.directory.clone();
            installed += 1;
        }
    }

    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmpm_platform::testing::RecordingRunner;
    use mmpm_platform::ProcessOutput;
    use std::fs;
    use tempfile::TempDir;

    fn catalog() -> Vec<Package> {
        vec![
            Package::new("MMM-Clock", "a", "https://github.com/a/MMM-Clock", "", "Utility"),
            Package::new("MMM-Weather", "b", "https://github.com/b/MMM-Weather.git", "", "Weather"),
            Package::new("MMM-News", "c", "https://github.com/c/MMM-News", "", "News"),
        ]
    }

    fn checkout(modules: &Path, name: &str) {
        fs::create_dir_all(modules.join(name).join(".git")).unwrap();
    }

    #[test]
    fn test_scan_and_mark() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path();
        checkout(modules, "MMM-Clock");
        fs::create_dir_all(modules.join("not-a-repo")).unwrap();

        let runner = RecordingRunner::new();
        runner.on(
            "git",
            Some("config"),
            ProcessOutput::new(0, "https://github.com/a/MMM-Clock.git\n", ""),
        );

        let found = scan(modules, &runner, None);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].directory, PathBuf::from("MMM-Clock"));

        let mut packages = catalog();
        assert_eq!(mark_installed(&mut packages, &found), 1);
        assert!(packages[0].is_installed);
        assert!(!packages[1].is_installed);
        assert_eq!(runner.calls()[0].cwd.as_deref(), Some(modules.join("MMM-Clock").as_path()));
    }

    #[test]
    fn test_unreadable_remote_is_skipped() {
        let tmp = TempDir::new().unwrap();
        checkout(tmp.path(), "broken");
        let runner = RecordingRunner::new();
        runner.on("git", Some("config"), ProcessOutput::new(1, "", "fatal: not a git repository"));

        assert!(scan(tmp.path(), &runner, None).is_empty());
    }

    #[test]
    fn test_missing_modules_dir() {
        let tmp = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        assert!(scan(&tmp.path().join("modules"), &runner, None).is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_mark_installed_is_idempotent() {
        let found = vec![
            Package::new("MMM-Weather", NA, "https://github.com/b/MMM-Weather", NA, NA)
                .with_directory("MMM-Weather"),
            Package::new("news", NA, "https://GitHub.com/c/MMM-News.git", NA, NA)
                .with_directory("news"),
        ];

        let mut packages = catalog();
        packages[0].is_installed = true;

        mark_installed(&mut packages, &found);
        let state = |packages: &[Package]| -> Vec<_> {
            packages.iter().map(|p| (p.is_installed, p.directory.clone())).collect()
        };
        let first = state(&packages);
        mark_installed(&mut packages, &found);
        let second = state(&packages);

        assert_eq!(first, second);
        assert_eq!(
            first.iter().map(|(installed, _)| *installed).collect::<Vec<_>>(),
            vec![false, true, true]
        );
        assert_eq!(packages[2].directory, PathBuf::from("news"));
    }

    #[test]
    fn test_unmatched_package_forgets_old_directory() {
        let renamed = vec![Package::new("clock", NA, "https://github.com/a/MMM-Clock", NA, NA)
            .with_directory("clock")];
        let mut packages = catalog();

        mark_installed(&mut packages, &renamed);
        assert_eq!(packages[0].directory, PathBuf::from("clock"));

        assert_eq!(mark_installed(&mut packages, &[]), 0);
        assert!(!packages[0].is_installed);
        assert_eq!(packages[0].directory, PathBuf::new());
        assert_eq!(
            packages[0].install_path(Path::new("/mm/modules")),
            Some(PathBuf::from("/mm/modules/MMM-Clock"))
        );
    }
}
