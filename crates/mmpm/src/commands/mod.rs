//! CLI command implementations.
//!
//! Every command opens a [`Session`], which wires the environment file, the
//! data directory and the system process runner into a [`SharedCatalog`].

pub mod ui;
mod core;

pub use core::{
    db, env, install, list, mm_pkg_add, mm_pkg_remove, remove, search, show, update, upgrade,
    version, ListFilter,
};

use crate::host::MagicMirror;
use miette::{IntoDiagnostic, Result};
use mmpm_catalog::{Catalog, CatalogContext, SharedCatalog, WikiScraper};
use mmpm_config::{ConfigAccessor, DataPaths, Environment};
use mmpm_platform::{ProcessRunner, Prompter, SystemRunner};
use std::sync::Arc;

/// Everything a command needs.
#[derive(Clone)]
pub struct Session {
    pub paths: DataPaths,
    pub env: Arc<Environment>,
    pub runner: Arc<dyn ProcessRunner>,
    pub catalog: SharedCatalog,
}

impl Session {
    /// Open the data directory and environment file.
    ///
    /// `quiet` hides process spinners.
    pub fn open(quiet: bool, prompter: Arc<dyn Prompter>) -> Result<Self> {
        let paths = DataPaths::open().into_diagnostic()?;
        let env = Arc::new(Environment::open(paths.env_file()).into_diagnostic()?);

        let runner: Arc<dyn ProcessRunner> = if quiet {
            Arc::new(SystemRunner::quiet())
        } else {
            Arc::new(SystemRunner::new())
        };

        let ctx = CatalogContext {
            paths: paths.clone(),
            config: env.clone(),
            runner: runner.clone(),
            prompter,
            scraper: Arc::new(WikiScraper::new()),
        };

        Ok(Self {
            paths,
            env,
            runner,
            catalog: SharedCatalog::new(Catalog::new(ctx)),
        })
    }

    /// Load the catalog, scraping the wiki when the cache is stale or `refresh` is set.
    pub async fn load(&self, refresh: bool) -> Result<()> {
        self.with_catalog(move |catalog| catalog.load(refresh))
            .await?
            .into_diagnostic()
    }

    /// Run `f` against the catalog on the blocking pool.
    pub async fn with_catalog<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Catalog) -> T + Send + 'static,
        T: Send + 'static,
    {
        self.catalog.run(f).await.into_diagnostic()
    }

    /// Controller for the configured MagicMirror checkout.
    pub fn host(&self) -> MagicMirror {
        MagicMirror::new(self.env.clone() as Arc<dyn ConfigAccessor>, self.runner.clone())
    }
}
