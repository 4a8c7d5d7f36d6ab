//! External process execution and interactive prompts for mmpm.
//!
//! Everything that touches `git`, `npm`, `make` and friends goes through the
//! [`ProcessRunner`] trait so the package logic can be driven by a scripted
//! runner in tests.

mod prompt;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use prompt::{AssumeYes, Prompter};

use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Exit code reported for a command killed after exceeding its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// How long to keep reading a killed command's pipes.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("Required tool '{0}' was not found in PATH")]
    ToolNotFound(String),
    #[error("Failed to execute {program}: {source}")]
    ExecutionError {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// A command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory, the current one when `None`.
    pub cwd: Option<PathBuf>,
    /// Message shown next to a spinner while the command runs.
    pub progress: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            cwd: None,
            progress: None,
            timeout: None,
        }
    }

    pub fn cwd(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn progress(mut self, message: impl Into<String>) -> Self {
        self.progress = Some(message.into());
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `program arg1 arg2`, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn new(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == 0
    }

    pub fn timed_out(&self) -> bool {
        self.code == TIMEOUT_EXIT_CODE
    }
}

/// Runs external commands.
///
/// A program that cannot be spawned is an `Err`. A program that runs and
/// exits non-zero is an `Ok` with a non-zero `code`.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, PlatformError>;
}

/// Runs commands on the host with piped output.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    /// Hide spinners (quiet mode, API server).
    pub hide_progress: bool,
}

impl SystemRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn quiet() -> Self {
        Self {
            hide_progress: true,
        }
    }

    fn spinner(&self, spec: &CommandSpec) -> Option<ProgressBar> {
        if self.hide_progress {
            return None;
        }

        let message = spec.progress.clone()?;
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, spec: &CommandSpec) -> Result<ProcessOutput, PlatformError> {
        debug!("Running `{}`", spec.display());

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = &spec.cwd {
            command.current_dir(dir);
        }

        // own process group, so a timeout also reaches npm scripts and the like
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }

        let mut child = command.spawn().map_err(|source| PlatformError::ExecutionError {
            program: spec.program.clone(),
            source,
        })?;

        // drain both pipes while waiting
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let spinner = self.spinner(spec);
        let code = wait(&mut child, spec.timeout, &spec.program)?;

        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }

        // a descendant outside the group may still hold the pipes open
        let grace = code.is_none().then_some(DRAIN_GRACE);
        let stdout = collect(&stdout, grace);
        let mut stderr = collect(&stderr, grace);

        let code = match code {
            Some(code) => code,
            None => {
                warn!("`{}` timed out and was killed", spec.display());
                if !stderr.is_empty() {
                    stderr.push('\n');
                }
                stderr.push_str("process timed out");
                TIMEOUT_EXIT_CODE
            }
        };

        debug!("`{}` exited with {}", spec.display(), code);
        Ok(ProcessOutput { code, stdout, stderr })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Output drained from a pipe, giving up after `grace` if one is set.
fn collect(rx: &mpsc::Receiver<String>, grace: Option<Duration>) -> String {
    match grace {
        Some(grace) => rx.recv_timeout(grace).unwrap_or_default(),
        None => rx.recv().unwrap_or_default(),
    }
}

/// Kill `child` along with every process in its group.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Ok(pgid) = libc::pid_t::try_from(child.id()) {
            // SAFETY: killpg only sends a signal to the group spawned for this child
            unsafe {
                libc::killpg(pgid, libc::SIGKILL);
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Wait for `child`, killing it once `timeout` elapses.
///
/// Returns `None` when the child was killed.
fn wait(
    child: &mut Child,
    timeout: Option<Duration>,
    program: &str,
) -> Result<Option<i32>, PlatformError> {
    let io_err = |source| PlatformError::ExecutionError {
        program: program.to_string(),
        source,
    };

    let Some(timeout) = timeout else {
        let status = child.wait().map_err(io_err)?;
        return Ok(Some(status.code().unwrap_or(-1)));
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(io_err)? {
            return Ok(Some(status.code().unwrap_or(-1)));
        }

        if started.elapsed() >= timeout {
            kill_tree(child);
            return Ok(None);
        }

        thread::sleep(Duration::from_millis(50));
    }
}

/// Ensure `tool` is on `PATH`.
pub fn require_tool(tool: &str) -> Result<PathBuf, PlatformError> {
    which::which(tool).map_err(|_| PlatformError::ToolNotFound(tool.to_string()))
}

/// Number of parallel jobs to hand to `make -j`.
pub fn available_jobs() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}
