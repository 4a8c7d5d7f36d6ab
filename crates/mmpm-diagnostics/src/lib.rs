//! User-facing errors for mmpm.
//!
//! Fatal conditions are reported through miette with an error code and, where
//! there is something the user can do about it, a hint.

// These fields are used by thiserror/miette derive macros
#![allow(unused_assignments)]

pub use miette::{Diagnostic, Report, Result};
use thiserror::Error;

/// A fatal mmpm error.
#[derive(Error, Diagnostic, Debug)]
pub enum MmpmError {
    #[error("Unable to match '{names}' to any package")]
    #[diagnostic(
        code(mmpm::catalog::unknown_package),
        help("Package names are case-sensitive. Try `mmpm search {first}` to find the exact title")
    )]
    UnknownPackage { names: String, first: String },

    #[error("The package catalog is empty")]
    #[diagnostic(
        code(mmpm::catalog::empty),
        help("Check your internet connection, then run `mmpm db --refresh`")
    )]
    EmptyCatalog,

    #[error("'{tool}' was not found in PATH")]
    #[diagnostic(code(mmpm::platform::missing_tool), help("{help}"))]
    MissingTool { tool: String, help: String },

    #[error("The MagicMirror modules directory {path} does not exist")]
    #[diagnostic(
        code(mmpm::config::modules_dir),
        help("Set MMPM_MAGICMIRROR_ROOT in {env_file} to your MagicMirror installation")
    )]
    ModulesDirMissing { path: String, env_file: String },

    #[error("Failed to bind the API server to {address}")]
    #[diagnostic(
        code(mmpm::serve::bind),
        help("Is another process already listening on this port? Try `mmpm serve --port <PORT>`")
    )]
    BindFailed { address: String },

    #[error("{count} operation(s) failed")]
    #[diagnostic(code(mmpm::operation_failed))]
    OperationsFailed { count: usize },

    #[error("{0}")]
    #[diagnostic(code(mmpm::generic))]
    Generic(String),
}

impl MmpmError {
    pub fn unknown_packages(names: &[String]) -> Self {
        Self::UnknownPackage {
            names: names.join("', '"),
            first: names.first().cloned().unwrap_or_default(),
        }
    }

    pub fn missing_tool(tool: impl Into<String>) -> Self {
        let tool = tool.into();
        let help = match tool.as_str() {
            "git" => {
                "Install git with your system package manager (e.g. `sudo apt install git`)"
                    .to_string()
            }
            "npm" | "node" => "Install Node.js from https://nodejs.org".to_string(),
            other => format!("Install {} and make sure it is on your PATH", other),
        };
        Self::MissingTool { tool, help }
    }

    pub fn modules_dir_missing(path: impl Into<String>, env_file: impl Into<String>) -> Self {
        Self::ModulesDirMissing {
            path: path.into(),
            env_file: env_file.into(),
        }
    }
}

/// Setup miette for pretty error output.
pub fn setup(color: bool) {
    miette::set_hook(Box::new(move |_| {
        let opts = miette::MietteHandlerOpts::new()
            .terminal_links(true)
            .unicode(true)
            .context_lines(2)
            .tab_width(4);

        let opts = if color { opts } else { opts.color(false) };
        Box::new(opts.build())
    }))
    .ok();
}
