//! Controller for the MagicMirror installation itself.

use mmpm_catalog::HostApplication;
use mmpm_config::ConfigAccessor;
use mmpm_platform::{CommandSpec, ProcessRunner};
use mmpm_types::Outcome;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The MagicMirror checkout at `MMPM_MAGICMIRROR_ROOT`.
pub struct MagicMirror {
    config: Arc<dyn ConfigAccessor>,
    runner: Arc<dyn ProcessRunner>,
}

impl MagicMirror {
    pub fn new(config: Arc<dyn ConfigAccessor>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    fn command<const N: usize>(&self, program: &str, args: [&str; N]) -> CommandSpec {
        CommandSpec::new(program, args)
            .cwd(self.config.magicmirror_root())
            .timeout(self.config.process_timeout())
    }
}

impl HostApplication for MagicMirror {
    fn check_for_upgrade(&self) -> bool {
        let root = self.config.magicmirror_root();

        if !root.join(".git").exists() {
            warn!("{} is not a git checkout, skipping MagicMirror", root.display());
            return false;
        }

        let spec = self
            .command("git", ["fetch", "--dry-run"])
            .progress("Retrieving MagicMirror");

        match self.runner.run(&spec) {
            Ok(output) if output.success() => {
                !output.stdout.trim().is_empty() || !output.stderr.trim().is_empty()
            }
            Ok(output) => {
                error!("Unable to check MagicMirror for updates: {}", output.stderr.trim());
                false
            }
            Err(e) => {
                error!("Unable to check MagicMirror for updates: {}", e);
                false
            }
        }
    }

    fn upgrade(&self) -> Outcome {
        let root = self.config.magicmirror_root();

        if !root.is_dir() {
            return Outcome::failure(format!("{} does not exist", root.display()));
        }

        let steps = [
            self.command("git", ["checkout", "."]),
            self.command("git", ["pull"]).progress("Upgrading MagicMirror"),
            self.command("npm", ["install"]).progress("Installing MagicMirror dependencies"),
        ];

        for spec in &steps {
            let output = match self.runner.run(spec) {
                Ok(output) => output,
                Err(e) => return Outcome::failure(e.to_string()),
            };

            if !output.success() {
                error!("`{}` failed: {}", spec.display(), output.stderr.trim());
                return Outcome::failure(output.stderr.trim());
            }
        }

        info!("Upgraded MagicMirror");
        Outcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mmpm_config::StaticConfig;
    use mmpm_platform::testing::RecordingRunner;
    use mmpm_platform::ProcessOutput;
    use std::fs;
    use tempfile::TempDir;

    fn host(tmp: &TempDir, runner: &Arc<RecordingRunner>) -> MagicMirror {
        MagicMirror::new(Arc::new(StaticConfig::new(tmp.path())), runner.clone())
    }

    #[test]
    fn test_not_a_checkout_is_not_upgradable() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());

        assert!(!host(&tmp, &runner).check_for_upgrade());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_fetch_output_means_upgradable() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join(".git")).unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.on(
            "git",
            Some("fetch"),
            ProcessOutput::new(0, "", "From github.com:MichMich/MagicMirror"),
        );

        assert!(host(&tmp, &runner).check_for_upgrade());
    }

    #[test]
    fn test_upgrade_stops_at_first_failure() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.on("git", Some("pull"), ProcessOutput::new(1, "", "divergent branches"));

        let outcome = host(&tmp, &runner).upgrade();

        assert_eq!(outcome, Outcome::failure("divergent branches"));
        assert_eq!(runner.command_lines(), vec!["git checkout .", "git pull"]);
    }

    #[test]
    fn test_upgrade_runs_all_steps() {
        let tmp = TempDir::new().unwrap();
        let runner = Arc::new(RecordingRunner::new());

        assert_eq!(host(&tmp, &runner).upgrade(), Outcome::Success);
        assert_eq!(runner.command_lines(), vec!["git checkout .", "git pull", "npm install"]);
    }
}
