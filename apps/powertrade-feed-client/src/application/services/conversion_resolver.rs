//! Conversion Resolver
//!
//! Maps a tradeable entity id to its price/quantity scale factors.
//!
//! The conversion table is loaded lazily on the first lookup and cached for
//! the process lifetime. The load is single-flight: concurrent first callers
//! wait on the one in-progress load and never observe a partially built table.
//! A failed load leaves the cache empty; nothing is ever served from a
//! partially parsed table. Lookups that arrive within the retry interval of a
//! failed load get that failure back without touching the source again.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::application::ports::{ConversionTableSource, SourceError};
use crate::domain::reference::{ConversionTable, ConversionTableFormat, TableParseError};
use crate::domain::scaling::ScaleFactors;
use crate::infrastructure::metrics;

/// Conversion table load errors. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConversionLoadError {
    /// Table could not be read.
    #[error("conversion table unavailable: {0}")]
    Source(#[from] SourceError),

    /// Table is malformed.
    #[error("malformed conversion table: {0}")]
    Parse(#[from] TableParseError),
}

/// Minimum time between lazy load attempts after a failure.
pub const DEFAULT_LOAD_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Lazily loaded, process-wide cache of scale factors.
pub struct ConversionResolver {
    source: Arc<dyn ConversionTableSource>,
    format: ConversionTableFormat,
    cache: OnceCell<ConversionTable>,
    load_attempts: AtomicU64,
    retry_interval: Duration,
    last_failure: Mutex<Option<(Instant, ConversionLoadError)>>,
}

impl std::fmt::Debug for ConversionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionResolver")
            .field("format", &self.format)
            .field("loaded", &self.is_loaded())
            .field("entries", &self.cache.get().map(ConversionTable::len))
            .finish_non_exhaustive()
    }
}

impl ConversionResolver {
    /// Create a resolver; nothing is read until the first lookup.
    #[must_use]
    pub fn new(source: Arc<dyn ConversionTableSource>, format: ConversionTableFormat) -> Self {
        Self {
            source,
            format,
            cache: OnceCell::new(),
            load_attempts: AtomicU64::new(0),
            retry_interval: DEFAULT_LOAD_RETRY_INTERVAL,
            last_failure: Mutex::new(None),
        }
    }

    /// Set how long a failed lazy load is reused before the source is read
    /// again.
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Resolve an entity id to its scale factors.
    ///
    /// Ids missing from the table resolve to [`ScaleFactors::IDENTITY`].
    ///
    /// # Errors
    ///
    /// Returns [`ConversionLoadError`] if the table is not loaded and either
    /// this call's load failed or a load failed within the retry interval.
    pub async fn resolve(&self, id: &str) -> Result<ScaleFactors, ConversionLoadError> {
        let table = self.table(true).await?;
        Ok(table.get(id).unwrap_or_else(|| {
            tracing::debug!(id, "No conversion factors, using (1, 1)");
            ScaleFactors::IDENTITY
        }))
    }

    /// Load the table now instead of on first lookup.
    ///
    /// Always reads the source unless the table is already cached. Returns
    /// the number of entries cached.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionLoadError`] if the table cannot be read or parsed.
    pub async fn preload(&self) -> Result<usize, ConversionLoadError> {
        Ok(self.table(false).await?.len())
    }

    /// Whether the table has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cache.initialized()
    }

    /// Number of times the backing source has been read.
    #[must_use]
    pub fn load_attempts(&self) -> u64 {
        self.load_attempts.load(Ordering::Relaxed)
    }

    async fn table(
        &self,
        honor_retry_interval: bool,
    ) -> Result<&ConversionTable, ConversionLoadError> {
        if let Some(table) = self.cache.get() {
            return Ok(table);
        }

        self.cache
            .get_or_try_init(|| async {
                if honor_retry_interval
                    && let Some(e) = self.recent_failure()
                {
                    return Err(e);
                }
                self.load().await.inspect_err(|e| {
                    *self.last_failure.lock() = Some((Instant::now(), e.clone()));
                })
            })
            .await
    }

    fn recent_failure(&self) -> Option<ConversionLoadError> {
        let last = self.last_failure.lock();
        let (at, error) = last.as_ref()?;
        (at.elapsed() < self.retry_interval).then(|| error.clone())
    }

    async fn load(&self) -> Result<ConversionTable, ConversionLoadError> {
        self.load_attempts.fetch_add(1, Ordering::Relaxed);

        let text = self.source.read_table().await.inspect_err(|e| {
            tracing::error!(error = %e, "Conversion table read failed");
        })?;

        let table = ConversionTable::parse(&text, self.format).inspect_err(|e| {
            tracing::error!(error = %e, "Conversion table parse failed");
        })?;

        metrics::record_conversion_table_load(table.len());
        tracing::info!(entries = table.len(), "Conversion table loaded");
        Ok(table)
    }
}
