//! Ruled-table extraction and word tallies for exam result PDFs
//!
//! This crate provides:
//! - Lattice (ruled-line) table extraction from PDF bytes using lopdf
//! - Normalization of the per-page tables onto a fixed column schema
//! - Word listing and word counting over a single column
//!
//! Every public pipeline entry point is fail-soft: a document that cannot be
//! read yields an empty table rather than an error.

pub mod detector;
pub mod extractor;
pub mod markdown;
pub mod query;
pub mod schema;
pub mod session;
pub mod tables;

pub use detector::{detect_document_kind, DetectionConfig, DocumentKind};
pub use markdown::{table_to_markdown, MarkdownOptions};
pub use query::{
    admission_message, count_word, distinct_words, list_columns, word_count_message,
    FrequencyIndex,
};
pub use schema::{
    normalize, normalize_with_schema, NormalizeOptions, NormalizedTable, Schema, WidthPolicy,
};
pub use session::{Fingerprint, Session, UploadView};
pub use tables::{extract, extract_path, extract_with_options, ExtractionOptions, RawPage};

use std::path::Path;

/// Settings for one run of extraction followed by normalization
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub extraction: ExtractionOptions,
    pub schema: Schema,
    pub normalize: NormalizeOptions,
}

/// Extract and normalize a document held in memory with default settings
pub fn load_table(buffer: &[u8]) -> NormalizedTable {
    load_table_with_config(buffer, &PipelineConfig::default())
}

/// Extract and normalize a document held in memory
pub fn load_table_with_config(buffer: &[u8], config: &PipelineConfig) -> NormalizedTable {
    let pages = extract_with_options(buffer, &config.extraction);
    normalize_with_schema(&pages, &config.schema, &config.normalize)
}

/// Read a document from disk, then extract and normalize it
///
/// Only the file read can fail; a file that is not a usable PDF still
/// produces an empty table.
pub fn load_table_from_path<P: AsRef<Path>>(
    path: P,
    config: &PipelineConfig,
) -> Result<NormalizedTable, TallyError> {
    let buffer = std::fs::read(path)?;
    Ok(load_table_with_config(&buffer, config))
}

#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl From<lopdf::Error> for TallyError {
    fn from(e: lopdf::Error) -> Self {
        TallyError::Parse(e.to_string())
    }
}
