//! Entity Resolver
//!
//! Maps a tradeable entity id to its product symbol using the reference
//! dataset loaded once at startup.

use std::sync::Arc;

use crate::application::ports::ReferenceDataSource;
use crate::domain::reference::ReferenceEntry;

/// Symbol returned when the dataset is loaded but has no matching id.
pub const UNKNOWN_PRODUCT: &str = "Unknown";

/// Symbol returned when no dataset is loaded.
pub const UNRESOLVED_PRODUCT: &str = "Error";

/// Read-only product lookup over the reference dataset.
///
/// The dataset is held in an immutable shared slice, so concurrent
/// resolution from every feed task needs no synchronization.
#[derive(Debug, Clone, Default)]
pub struct EntityResolver {
    dataset: Option<Arc<[ReferenceEntry]>>,
}

impl EntityResolver {
    /// Create a resolver over a loaded dataset.
    #[must_use]
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        Self {
            dataset: Some(entries.into()),
        }
    }

    /// Create a resolver with no dataset; every lookup yields [`UNRESOLVED_PRODUCT`].
    #[must_use]
    pub const fn unloaded() -> Self {
        Self { dataset: None }
    }

    /// Load the dataset from `source`.
    ///
    /// A failed load is not fatal: the error is logged and the resolver
    /// degrades to [`UNRESOLVED_PRODUCT`] for every lookup.
    pub async fn load(source: &dyn ReferenceDataSource) -> Self {
        match source.load().await {
            Ok(entries) => {
                tracing::info!(entries = entries.len(), "Reference data loaded");
                Self::new(entries)
            }
            Err(e) => {
                tracing::error!(error = %e, "Reference data unavailable, products will resolve to \"Error\"");
                Self::unloaded()
            }
        }
    }

    /// Resolve an entity id to its product symbol.
    #[must_use]
    pub fn resolve(&self, id: &str) -> &str {
        let Some(dataset) = &self.dataset else {
            tracing::error!(id, "No reference data loaded");
            return UNRESOLVED_PRODUCT;
        };

        dataset
            .iter()
            .find(|entry| entry.id == id)
            .map_or(UNKNOWN_PRODUCT, |entry| entry.symbol.as_str())
    }

    /// Whether a dataset is loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.dataset.is_some()
    }

    /// Number of entries in the dataset (0 when unloaded).
    #[must_use]
    pub fn len(&self) -> usize {
        self.dataset.as_ref().map_or(0, |d| d.len())
    }

    /// Whether the dataset is absent or empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
