//! Schema normalization
//!
//! Concatenates the per-page tables, discards the header row the extraction
//! carries at the top, and renames the columns positionally onto a fixed
//! [`Schema`]. Anything that does not fit the schema degrades to an empty
//! table instead of an error.

use crate::tables::RawPage;
use crate::TallyError;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Column names of the exam result layout, in order
pub const EXAM_COLUMNS: [&str; 8] = [
    "IRE",
    "RANG",
    "EX",
    "PRENOM et NOM",
    "CENTRE",
    "PV",
    "ORIGINE",
    "Mention",
];

/// Ordered column names imposed on extracted tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<String>,
}

impl Schema {
    /// Build a schema; names must be non-blank and unique
    pub fn new<I, S>(columns: I) -> Result<Self, TallyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.is_empty() {
            return Err(TallyError::InvalidSchema("no columns".into()));
        }

        let mut seen = HashSet::new();
        for name in &columns {
            if name.trim().is_empty() {
                return Err(TallyError::InvalidSchema("blank column name".into()));
            }
            if !seen.insert(name.as_str()) {
                return Err(TallyError::InvalidSchema(format!(
                    "duplicate column name {:?}",
                    name
                )));
            }
        }

        Ok(Self { columns })
    }

    /// The 8-column exam result layout
    pub fn exam_results() -> Self {
        Self {
            columns: EXAM_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::exam_results()
    }
}

/// Parses a comma-separated list of column names
impl FromStr for Schema {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.split(',').map(str::trim))
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.columns.join(","))
    }
}

/// What to do with pages whose column count differs from the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidthPolicy {
    /// Any mismatching page empties the whole table
    #[default]
    DegradeToEmpty,
    /// Mismatching pages are left out, the rest is kept
    DropMismatchedPages,
}

/// Options for normalization
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    pub width_policy: WidthPolicy,
    /// Also drop later rows identical to the discarded header row
    pub drop_repeated_headers: bool,
}

/// The single canonical table
///
/// Either empty (no columns, no rows) or every row has exactly one value
/// per column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl NormalizedTable {
    /// The table with no columns and no rows
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a table, rejecting rows whose width differs from the columns
    pub fn new(columns: Vec<String>, rows: Vec<Vec<String>>) -> Option<Self> {
        if rows.iter().any(|row| row.len() != columns.len()) {
            return None;
        }
        Some(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// True for the degraded table with no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Values of one column in row order, `None` for an unknown column
    pub fn column_values<'a>(
        &'a self,
        column: &str,
    ) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.column_index(column)?;
        Some(self.rows.iter().map(move |row| row[idx].as_str()))
    }

    /// Rows as (column, value) pairs in column order
    pub fn records(&self) -> Vec<Vec<(&str, &str)>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(String::as_str)
                    .zip(row.iter().map(String::as_str))
                    .collect()
            })
            .collect()
    }
}

/// Normalize onto the exam result schema with default options
pub fn normalize(pages: &[RawPage]) -> NormalizedTable {
    normalize_with_schema(pages, &Schema::default(), &NormalizeOptions::default())
}

/// Concatenate pages, drop the leading header row and apply the schema
pub fn normalize_with_schema(
    pages: &[RawPage],
    schema: &Schema,
    options: &NormalizeOptions,
) -> NormalizedTable {
    let pages: Vec<&RawPage> = pages.iter().filter(|p| !p.is_empty()).collect();
    if pages.is_empty() {
        return NormalizedTable::empty();
    }

    let pages: Vec<&RawPage> = match options.width_policy {
        WidthPolicy::DegradeToEmpty => {
            if let Some(page) = pages.iter().find(|p| p.width() != schema.width()) {
                log::warn!(
                    "page {} has {} columns, expected {}; table discarded",
                    page.page,
                    page.width(),
                    schema.width()
                );
                return NormalizedTable::empty();
            }
            pages
        }
        WidthPolicy::DropMismatchedPages => pages
            .into_iter()
            .filter(|p| {
                let keep = p.width() == schema.width();
                if !keep {
                    log::warn!(
                        "page {} has {} columns, expected {}; page dropped",
                        p.page,
                        p.width(),
                        schema.width()
                    );
                }
                keep
            })
            .collect(),
    };

    let mut rows = pages.iter().flat_map(|p| p.rows.iter().cloned());
    let Some(header) = rows.next() else {
        return NormalizedTable::empty();
    };

    let rows: Vec<Vec<String>> = if options.drop_repeated_headers {
        rows.filter(|row| *row != header).collect()
    } else {
        rows.collect()
    };

    log::debug!(
        "normalized {} rows from {} pages (header {:?} dropped)",
        rows.len(),
        pages.len(),
        header
    );

    NormalizedTable {
        columns: schema.columns().to_vec(),
        rows,
    }
}
