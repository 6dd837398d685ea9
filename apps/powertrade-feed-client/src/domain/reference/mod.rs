//! Reference Data Types
//!
//! The two read-only datasets the pipeline resolves against:
//!
//! - **Reference dataset**: tradeable entity id → product symbol
//!   (e.g. `"1234"` → `"ETH-20241003-2800C"`)
//! - **Conversion table**: tradeable entity id → price/quantity scale exponents
//!
//! # Conversion Table Format
//!
//! ```text
//! entity_id,<ignored...>,price_exponent,quantity_exponent
//! 1,,1,2
//! ```

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use serde::{Deserialize, Serialize};

use super::scaling::{ScaleError, ScaleFactors};

// =============================================================================
// Reference Dataset
// =============================================================================

/// One tradeable entity in the venue's reference dataset.
///
/// The venue summary carries many more fields; only `id` and `symbol` are used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Tradeable entity id in string form.
    #[serde(deserialize_with = "super::streaming::string_or_number")]
    pub id: String,
    /// Product symbol.
    pub symbol: String,
}

impl ReferenceEntry {
    /// Create an entry.
    #[must_use]
    pub fn new(id: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
        }
    }
}

// =============================================================================
// Conversion Table
// =============================================================================

/// Layout of the delimited conversion table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionTableFormat {
    /// Column delimiter byte.
    pub delimiter: u8,
    /// Whether the first line is a header to skip.
    pub has_header: bool,
}

impl Default for ConversionTableFormat {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: false,
        }
    }
}

/// Parsed conversion table: entity id → scale factors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversionTable {
    entries: HashMap<String, ScaleFactors>,
}

impl ConversionTable {
    /// Parse the full table.
    ///
    /// Rows follow RFC 4180 quoting and rows may differ in width. Parsing is
    /// all-or-nothing: any malformed row fails the whole table. Blank lines
    /// are skipped; the first row wins for duplicate ids.
    ///
    /// # Errors
    ///
    /// Returns [`TableParseError`] naming the first malformed line.
    pub fn parse(text: &str, format: ConversionTableFormat) -> Result<Self, TableParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(format.delimiter)
            .has_headers(format.has_header)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut entries = HashMap::new();

        for row in reader.records() {
            let record = row.map_err(|e| TableParseError::Malformed {
                line: line_of(e.position()),
                message: e.to_string(),
            })?;
            let line_number = line_of(record.position());
            if record.iter().all(str::is_empty) {
                continue;
            }

            let columns: Vec<&str> = record.iter().collect();
            let [id, .., price, quantity] = columns.as_slice() else {
                return Err(TableParseError::TooFewColumns {
                    line: line_number,
                    found: columns.len(),
                });
            };

            if id.is_empty() {
                return Err(TableParseError::MissingId { line: line_number });
            }

            let factors = ScaleFactors::from_exponents(
                parse_exponent(price, line_number)?,
                parse_exponent(quantity, line_number)?,
            )
            .map_err(|source| TableParseError::Scale {
                line: line_number,
                source,
            })?;

            match entries.entry((*id).to_string()) {
                Entry::Vacant(slot) => {
                    slot.insert(factors);
                }
                Entry::Occupied(_) => {
                    tracing::debug!(
                        id,
                        line = line_number,
                        "Duplicate conversion row ignored"
                    );
                }
            }
        }

        Ok(Self { entries })
    }

    /// Scale factors for an entity id, if present.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<ScaleFactors> {
        self.entries.get(id).copied()
    }

    /// Number of entities in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn line_of(position: Option<&csv::Position>) -> usize {
    position
        .and_then(|p| usize::try_from(p.line()).ok())
        .unwrap_or_default()
}

fn parse_exponent(field: &str, line: usize) -> Result<u32, TableParseError> {
    field
        .parse::<u32>()
        .map_err(|_| TableParseError::InvalidExponent {
            line,
            value: field.to_string(),
        })
}

/// Conversion table parse errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableParseError {
    /// Row has fewer than id + two exponent columns.
    #[error("line {line}: expected at least 3 columns, found {found}")]
    TooFewColumns {
        /// 1-based line number.
        line: usize,
        /// Columns present.
        found: usize,
    },

    /// Row has an empty id column.
    #[error("line {line}: missing entity id")]
    MissingId {
        /// 1-based line number.
        line: usize,
    },

    /// Exponent column is not a non-negative integer.
    #[error("line {line}: invalid exponent {value:?}")]
    InvalidExponent {
        /// 1-based line number.
        line: usize,
        /// Offending field.
        value: String,
    },

    /// Row is not valid delimited text.
    #[error("line {line}: {message}")]
    Malformed {
        /// 1-based line number.
        line: usize,
        /// Reader error.
        message: String,
    },

    /// Exponent out of range.
    #[error("line {line}: {source}")]
    Scale {
        /// 1-based line number.
        line: usize,
        /// Underlying scale error.
        source: ScaleError,
    },
}
