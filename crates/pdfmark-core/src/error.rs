use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Failed to load PDF: {0}")]
    Load(String),

    #[error("Failed to fetch PDF: {0}")]
    Fetch(String),

    #[error("Page {page} is out of range (document has {page_count} pages)")]
    OutOfRange { page: u32, page_count: u32 },

    #[error("Failed to save PDF: {0}")]
    Export(#[from] ExportError),

    #[error("No document loaded")]
    NoDocument,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid color: {0}")]
    InvalidColor(String),
}

/// Reasons a flatten/export can fail. Each variant is raised before any
/// output bytes are produced.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("source document is corrupt: {0}")]
    Corrupt(String),

    #[error("source document is encrypted and cannot be modified: {0}")]
    Encrypted(String),

    #[error("annotation references page {0}, which the document does not have")]
    MissingPage(u32),

    #[error("failed to write output: {0}")]
    Write(String),
}
