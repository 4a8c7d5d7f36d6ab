//! Clone and build orchestration for mmpm packages.
//!
//! A package is a git repository cloned into the MagicMirror modules
//! directory. After cloning, the build descriptors found at its root decide
//! which commands run, always in this order:
//!
//! 1. `npm install` for `package.json`
//! 2. `bundle install` for `Gemfile`
//! 3. `make -j N` for `Makefile`
//! 4. `cmake ..` in `build/` for `CMakeLists.txt`, then `make -j N` there
//!
//! A failed step does not stop the remaining ones. If anything failed by the
//! end of an install, the freshly cloned directory is removed.

use mmpm_platform::{available_jobs, CommandSpec, PlatformError, ProcessOutput, ProcessRunner};
use mmpm_types::Package;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("{0} does not exist. Is MMPM_MAGICMIRROR_ROOT set properly?")]
    ModulesDirMissing(PathBuf),
    #[error("Failed to clone {title}: {message}")]
    CloneFailed { title: String, message: String },
    #[error("{0} has an install directory outside the modules directory")]
    InvalidDirectory(String),
    #[error("Unable to locate the cloned directory for {0}")]
    CloneDirectoryNotFound(String),
    #[error("Build failed for {title}: {message}")]
    StepFailed { title: String, message: String },
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

/// One build command derived from a descriptor file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    NpmInstall,
    BundleInstall,
    Make,
    CmakeConfigure,
    CmakeMake,
}

impl BuildStep {
    /// The descriptor file that triggers this step.
    pub fn descriptor(&self) -> &'static str {
        match self {
            Self::NpmInstall => "package.json",
            Self::BundleInstall => "Gemfile",
            Self::Make | Self::CmakeMake => "Makefile",
            Self::CmakeConfigure => "CMakeLists.txt",
        }
    }

    fn command(&self, jobs: usize) -> CommandSpec {
        match self {
            Self::NpmInstall => CommandSpec::new("npm", ["install"]),
            Self::BundleInstall => CommandSpec::new("bundle", ["install"]),
            Self::Make | Self::CmakeMake => {
                CommandSpec::new("make", ["-j".to_string(), jobs.to_string()])
            }
            Self::CmakeConfigure => CommandSpec::new("cmake", [".."]),
        }
    }
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NpmInstall => "npm install",
            Self::BundleInstall => "bundle install",
            Self::Make => "make",
            Self::CmakeConfigure => "cmake",
            Self::CmakeMake => "make (cmake build)",
        };
        f.write_str(name)
    }
}

/// Result of a single build step.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step: BuildStep,
    pub output: ProcessOutput,
}

impl StepResult {
    fn failure_text(&self) -> String {
        let detail = if self.output.stderr.trim().is_empty() {
            self.output.stdout.trim()
        } else {
            self.output.stderr.trim()
        };
        format!("{} exited with {}: {}", self.step, self.output.code, detail)
    }
}

/// Everything that ran while building one package directory.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub steps: Vec<StepResult>,
}

impl BuildReport {
    pub fn succeeded(&self) -> bool {
        self.steps.iter().all(|s| s.output.success())
    }

    /// Error text of the first failed step.
    pub fn first_failure(&self) -> Option<String> {
        self.steps
            .iter()
            .find(|s| !s.output.success())
            .map(StepResult::failure_text)
    }

    pub fn ran(&self) -> Vec<BuildStep> {
        self.steps.iter().map(|s| s.step).collect()
    }
}

/// Whether `dir` contains `file_name` under its exact, lowercase or uppercase spelling.
pub fn descriptor_exists(dir: &Path, file_name: &str) -> bool {
    [
        file_name.to_string(),
        file_name.to_lowercase(),
        file_name.to_uppercase(),
    ]
    .iter()
    .any(|name| dir.join(name).exists())
}

/// Clones packages into the modules directory and builds them.
pub struct InstallationHandler<'a> {
    runner: &'a dyn ProcessRunner,
    modules_dir: PathBuf,
    timeout: Option<Duration>,
    jobs: usize,
}

impl<'a> InstallationHandler<'a> {
    pub fn new(runner: &'a dyn ProcessRunner, modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            modules_dir: modules_dir.into(),
            timeout: None,
            jobs: available_jobs(),
        }
    }

    /// Per-command timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Parallelism handed to `make -j`.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn modules_dir(&self) -> &Path {
        &self.modules_dir
    }

    /// Clone `package` and build it.
    ///
    /// Returns the directory the package ended up in. On a build failure the
    /// cloned directory has already been removed when this returns.
    pub fn install(&self, package: &Package) -> Result<PathBuf, BuildError> {
        if !self.modules_dir.is_dir() {
            error!("{} does not exist", self.modules_dir.display());
            return Err(BuildError::ModulesDirMissing(self.modules_dir.clone()));
        }

        let expected = package
            .install_path(&self.modules_dir)
            .ok_or_else(|| BuildError::InvalidDirectory(package.title().to_string()))?;
        let cloned = !expected.exists();

        let directory = if cloned {
            self.clone_package(package, &expected)?
        } else {
            info!("{} already exists, building in place", expected.display());
            expected
        };

        let report = self.build(&directory);

        match report.first_failure() {
            None => {
                info!("Installed {} into {}", package.title(), directory.display());
                Ok(directory)
            }
            Some(message) => {
                if cloned {
                    info!("Installation failed. Removing {}", directory.display());
                    if let Err(e) = fs::remove_dir_all(&directory) {
                        warn!("Failed to remove {}: {}", directory.display(), e);
                    }
                }
                Err(BuildError::StepFailed {
                    title: package.title().to_string(),
                    message,
                })
            }
        }
    }

    fn clone_package(&self, package: &Package, expected: &Path) -> Result<PathBuf, BuildError> {
        let before = self.listing()?;

        let spec = CommandSpec::new(
            "git",
            [
                "clone".to_string(),
                package.repository().to_string(),
                expected.to_string_lossy().into_owned(),
            ],
        )
        .cwd(&self.modules_dir)
        .progress(format!("Cloning {}", package.title()))
        .timeout(self.timeout);

        info!("Cloning {} into {}", package.repository(), expected.display());
        let output = self.runner.run(&spec)?;

        if !output.success() {
            error!("Failed to clone {}: {}", package.title(), output.stderr.trim());
            if expected.exists() {
                let _ = fs::remove_dir_all(expected);
            }
            return Err(BuildError::CloneFailed {
                title: package.title().to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        if expected.is_dir() {
            return Ok(expected.to_path_buf());
        }

        // git picked a different name; find what appeared
        let after = self.listing()?;
        let mut created = after.difference(&before);

        match (created.next(), created.next()) {
            (Some(name), None) => Ok(self.modules_dir.join(name)),
            _ => Err(BuildError::CloneDirectoryNotFound(package.title().to_string())),
        }
    }

    fn listing(&self) -> Result<BTreeSet<String>, BuildError> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.modules_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.insert(entry.file_name().to_string_lossy().into_owned());
            }
        }
        Ok(names)
    }

    /// Run every build step whose descriptor is present in `dir`.
    ///
    /// Also used after `git pull` when upgrading. Never removes anything.
    pub fn build(&self, dir: &Path) -> BuildReport {
        let mut report = BuildReport::default();

        for step in [BuildStep::NpmInstall, BuildStep::BundleInstall, BuildStep::Make] {
            if descriptor_exists(dir, step.descriptor()) {
                report.steps.push(self.run_step(step, dir));
            }
        }

        if descriptor_exists(dir, BuildStep::CmakeConfigure.descriptor()) {
            let build_dir = dir.join("build");

            if let Err(e) = reset_dir(&build_dir) {
                warn!("Unable to prepare {}: {}", build_dir.display(), e);
            }

            report.steps.push(self.run_step(BuildStep::CmakeConfigure, &build_dir));

            if descriptor_exists(&build_dir, BuildStep::CmakeMake.descriptor()) {
                report.steps.push(self.run_step(BuildStep::CmakeMake, &build_dir));
            }
        }

        report
    }

    fn run_step(&self, step: BuildStep, dir: &Path) -> StepResult {
        info!("Found {}. Running `{}` in {}", step.descriptor(), step, dir.display());

        let spec = step
            .command(self.jobs)
            .cwd(dir)
            .progress(format!("Running {}", step))
            .timeout(self.timeout);

        let output = match self.runner.run(&spec) {
            Ok(output) => output,
            Err(e) => ProcessOutput::new(127, "", e.to_string()),
        };

        if !output.success() {
            error!("{} failed ({}): {}", step, output.code, output.stderr.trim());
        }

        StepResult { step, output }
    }
}

/// Create `dir`, emptying it first if it already exists.
fn reset_dir(dir: &Path) -> std::io::Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)
}
