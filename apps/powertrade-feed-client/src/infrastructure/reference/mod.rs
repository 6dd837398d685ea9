//! File-backed Reference Data Sources
//!
//! Adapters for the [`ReferenceDataSource`] and [`ConversionTableSource`]
//! ports that read from local files with `tokio::fs`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::application::ports::{ConversionTableSource, ReferenceDataSource, SourceError};
use crate::domain::reference::ReferenceEntry;

/// Reads the reference dataset from a JSON array file.
#[derive(Debug, Clone)]
pub struct JsonFileReferenceSource {
    path: PathBuf,
}

impl JsonFileReferenceSource {
    /// Create a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ReferenceDataSource for JsonFileReferenceSource {
    async fn load(&self) -> Result<Vec<ReferenceEntry>, SourceError> {
        let location = self.path.display().to_string();
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable {
                location: location.clone(),
                message: e.to_string(),
            })?;

        let entries: Vec<ReferenceEntry> =
            serde_json::from_slice(&bytes).map_err(|e| SourceError::Decode {
                location: location.clone(),
                message: e.to_string(),
            })?;

        if entries.is_empty() {
            return Err(SourceError::Empty { location });
        }
        Ok(entries)
    }
}

/// Reads the raw conversion table text from a file.
#[derive(Debug, Clone)]
pub struct CsvFileConversionSource {
    path: PathBuf,
}

impl CsvFileConversionSource {
    /// Create a source for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConversionTableSource for CsvFileConversionSource {
    async fn read_table(&self) -> Result<String, SourceError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SourceError::Unavailable {
                location: self.path.display().to_string(),
                message: e.to_string(),
            })
    }
}
