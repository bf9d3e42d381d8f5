//! Per-session table cache keyed by document content
//!
//! The interaction layer sends the uploaded bytes again with every query.
//! Instead of re-running extraction each time, a [`Session`] keeps the last
//! normalized table together with the SHA-256 fingerprint of the bytes it
//! came from, and only re-extracts when the fingerprint changes.

use crate::query::{distinct_words, list_columns, word_count_message};
use crate::schema::NormalizedTable;
use crate::{load_table_with_config, PipelineConfig};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

/// SHA-256 of a document's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(buffer: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(buffer);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&hasher.finalize());
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// What an upload hands back to the interaction layer
#[derive(Debug, Clone)]
pub struct UploadView {
    /// Choices for the column selector
    pub columns: Vec<String>,
    /// The table to display
    pub table: Arc<NormalizedTable>,
}

#[derive(Debug)]
struct CachedTable {
    fingerprint: Fingerprint,
    filename: String,
    table: Arc<NormalizedTable>,
}

/// One user's view of one uploaded document
#[derive(Debug, Default)]
pub struct Session {
    config: PipelineConfig,
    cached: Option<CachedTable>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            cached: None,
        }
    }

    /// Handle a new upload
    ///
    /// The previous document is forgotten. The filename is kept for display
    /// only and plays no part in extraction.
    pub fn upload(&mut self, buffer: &[u8], filename: &str) -> UploadView {
        let fingerprint = Fingerprint::of(buffer);
        let table = match self.cached.take() {
            Some(cached) if cached.fingerprint == fingerprint => {
                log::debug!("re-upload of {} reuses cached table", fingerprint);
                cached.table
            }
            _ => Arc::new(load_table_with_config(buffer, &self.config)),
        };
        log::info!(
            "uploaded {:?}: {} columns, {} rows",
            filename,
            table.columns().len(),
            table.row_count()
        );

        self.cached = Some(CachedTable {
            fingerprint,
            filename: filename.to_string(),
            table: Arc::clone(&table),
        });

        UploadView {
            columns: list_columns(&table),
            table,
        }
    }

    /// The table for `buffer`, from the cache when the content matches
    pub fn table_for(&mut self, buffer: &[u8]) -> Arc<NormalizedTable> {
        let fingerprint = Fingerprint::of(buffer);
        if let Some(cached) = &self.cached {
            if cached.fingerprint == fingerprint {
                log::debug!("cache hit for {}", fingerprint);
                return Arc::clone(&cached.table);
            }
        }

        log::debug!("cache miss for {}, extracting", fingerprint);
        let table = Arc::new(load_table_with_config(buffer, &self.config));
        // Content never seen through `upload`, so there is no filename for it
        self.cached = Some(CachedTable {
            fingerprint,
            filename: String::new(),
            table: Arc::clone(&table),
        });
        table
    }

    /// Choices for the word selector once a column is picked
    pub fn word_options(&mut self, buffer: &[u8], column: &str) -> Vec<String> {
        distinct_words(&self.table_for(buffer), column)
    }

    /// The count sentence once a column and a word are picked
    pub fn word_count(&mut self, buffer: &[u8], column: &str, word: &str) -> String {
        word_count_message(&self.table_for(buffer), column, word)
    }

    /// Forget the cached table
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn cached_fingerprint(&self) -> Option<Fingerprint> {
        self.cached.as_ref().map(|c| c.fingerprint)
    }

    pub fn filename(&self) -> Option<&str> {
        self.cached.as_ref().map(|c| c.filename.as_str())
    }
}
