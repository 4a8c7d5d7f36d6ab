//! A catalog shared between the CLI and concurrent API requests.

use crate::{Catalog, CatalogError};
use parking_lot::Mutex;
use std::sync::Arc;

/// Serializes all catalog work behind one lock.
///
/// Closures run on tokio's blocking pool since every catalog operation may
/// shell out or touch the network.
#[derive(Clone)]
pub struct SharedCatalog {
    inner: Arc<Mutex<Catalog>>,
}

impl SharedCatalog {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: Arc::new(Mutex::new(catalog)),
        }
    }

    /// Run `f` with exclusive access to the catalog.
    pub async fn run<F, T>(&self, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut Catalog) -> T + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        tokio::task::spawn_blocking(move || {
            let mut catalog = inner.lock();
            f(&mut catalog)
        })
        .await
        .map_err(|e| CatalogError::Task(e.to_string()))
    }
}
