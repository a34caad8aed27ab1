//! Error types for the collaborators behind the query router.
//!
//! None of these escape the resolvers: each failure is either recovered
//! (fallback, default-sheet retry) or turned into a sentinel response.

use thiserror::Error;

/// Failure talking to the language model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to Ollama at {0}")]
    Connect(String),

    #[error("Ollama API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to send request: {0}")]
    Request(String),

    #[error("failed to parse model response: {0}")]
    Decode(String),

    #[error("model does not support {0}")]
    Unsupported(&'static str),
}

/// Failure loading a table from a workbook.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid workbook archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("malformed workbook XML in {part}: {message}")]
    Xml { part: String, message: String },

    #[error("worksheet '{0}' not found")]
    SheetNotFound(String),

    #[error("worksheet {part} spans {rows} rows x {columns} columns, too large to load")]
    TooLarge {
        part: String,
        rows: usize,
        columns: usize,
    },

    #[error("workbook has no worksheets")]
    NoSheets,

    #[error("unsupported workbook format: {0}")]
    UnsupportedFormat(String),

    #[error("background load task failed: {0}")]
    Join(String),
}

/// Failure choosing a file for a query.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("catalog error: {0}")]
    Catalog(String),
}

/// Failure extracting tabular data from a document.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Error extracting images: {0}")]
    Archive(String),

    #[error("No images found in {0}")]
    NoImages(String),

    #[error(transparent)]
    Model(#[from] ModelError),
}
