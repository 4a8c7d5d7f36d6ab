//! Install, remove, update and upgrade of a single package.

use mmpm_build::{BuildError, InstallationHandler};
use mmpm_config::ConfigAccessor;
use mmpm_platform::{CommandSpec, ProcessRunner, Prompter};
use mmpm_types::{Outcome, Package};
use std::fs;
use tracing::{error, info, warn};

/// Per-package operations against the configured modules directory.
pub struct PackageLifecycle<'a> {
    config: &'a dyn ConfigAccessor,
    runner: &'a dyn ProcessRunner,
    prompter: &'a dyn Prompter,
}

impl<'a> PackageLifecycle<'a> {
    pub fn new(
        config: &'a dyn ConfigAccessor,
        runner: &'a dyn ProcessRunner,
        prompter: &'a dyn Prompter,
    ) -> Self {
        Self {
            config,
            runner,
            prompter,
        }
    }

    fn confirm(&self, question: &str, assume_yes: bool) -> bool {
        assume_yes || self.prompter.confirm(question)
    }

    fn handler(&self) -> InstallationHandler<'a> {
        InstallationHandler::new(self.runner, self.config.modules_dir())
            .with_timeout(self.config.process_timeout())
    }

    /// Clone and build `package`.
    ///
    /// Leaves `is_installed` alone; the next discovery pass decides that.
    pub fn install(&self, package: &Package, assume_yes: bool) -> Outcome {
        if package.is_installed {
            error!("{} is already installed", package.title());
            return Outcome::skipped(format!("{} is already installed", package.title()));
        }

        let question = format!("Install {} ({})?", package.title(), package.repository());
        if !self.confirm(&question, assume_yes) {
            return Outcome::skipped("declined");
        }

        match self.handler().install(package) {
            Ok(dir) => {
                info!("Installed {} at {}", package.title(), dir.display());
                Outcome::Success
            }
            Err(e) => {
                error!("{}", e);
                Outcome::failure(e.to_string())
            }
        }
    }

    /// Delete the install directory of `package`.
    pub fn remove(&self, package: &Package, assume_yes: bool) -> Outcome {
        if !package.is_installed {
            error!("{} is not installed", package.title());
            return Outcome::skipped(format!("{} is not installed", package.title()));
        }

        if !self.confirm(&format!("Remove {}?", package.title()), assume_yes) {
            return Outcome::skipped("declined");
        }

        let Some(path) = package.install_path(&self.config.modules_dir()) else {
            return self.outside_modules(package);
        };

        match fs::remove_dir_all(&path) {
            Ok(()) => {
                info!("Removed {}", path.display());
                Outcome::Success
            }
            Err(e) => {
                error!("Failed to remove {}: {}", path.display(), e);
                Outcome::failure(format!("Failed to remove {}: {}", path.display(), e))
            }
        }
    }

    /// Ask upstream whether `package` has new commits, without pulling.
    ///
    /// Sets `is_upgradable`. Never fails: problems are logged and leave the
    /// package marked as not upgradable.
    pub fn update(&self, package: &mut Package) {
        package.is_upgradable = false;

        let modules_dir = self.config.modules_dir();
        if !modules_dir.is_dir() {
            warn!("{} does not exist", modules_dir.display());
            return;
        }

        let Some(path) = package.install_path(&modules_dir) else {
            warn!("{} has an install directory outside the modules directory", package.title());
            return;
        };
        if !path.is_dir() {
            warn!("{} does not exist, skipping {}", path.display(), package.title());
            return;
        }

        let spec = CommandSpec::new("git", ["fetch", "--dry-run"])
            .cwd(&path)
            .progress(format!("Retrieving {}", package.title()))
            .timeout(self.config.process_timeout());

        match self.runner.run(&spec) {
            // git reports fetched refs on stderr
            Ok(output) if output.success() => {
                package.is_upgradable =
                    !output.stdout.trim().is_empty() || !output.stderr.trim().is_empty();
            }
            Ok(output) => {
                error!(
                    "Unable to communicate with git server for {}: {}",
                    package.title(),
                    output.stderr.trim()
                );
            }
            Err(e) => error!("Unable to check {} for updates: {}", package.title(), e),
        }
    }

    /// Pull new commits and rebuild.
    ///
    /// A failed build after a successful pull is reported but not rolled back.
    pub fn upgrade(&self, package: &Package) -> Outcome {
        let Some(path) = package.install_path(&self.config.modules_dir()) else {
            return self.outside_modules(package);
        };

        let spec = CommandSpec::new("git", ["pull"])
            .cwd(&path)
            .progress(format!("Upgrading {}", package.title()))
            .timeout(self.config.process_timeout());

        let output = match self.runner.run(&spec) {
            Ok(output) => output,
            Err(e) => return Outcome::failure(e.to_string()),
        };

        if !output.success() {
            error!("Failed to pull {}: {}", package.title(), output.stderr.trim());
            return Outcome::failure(output.stderr.trim());
        }

        match self.handler().build(&path).first_failure() {
            None => {
                info!("Upgraded {}", package.title());
                Outcome::Success
            }
            Some(message) => {
                let e = BuildError::StepFailed {
                    title: package.title().to_string(),
                    message,
                };
                error!("{}", e);
                Outcome::failure(e.to_string())
            }
        }
    }

    fn outside_modules(&self, package: &Package) -> Outcome {
        let e = BuildError::InvalidDirectory(package.title().to_string());
        error!("{}", e);
        Outcome::failure(e.to_string())
    }
}
