use thiserror::Error;

/// Main error type for floatingest
#[derive(Error, Debug)]
pub enum IngestError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input file is missing variables, has an unexpected shape, or carries
    /// values that cannot be decoded. The whole file is rejected.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Snapshot export errors
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// A blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl IngestError {
    /// Storage-side failures that may succeed on a later run without the
    /// input changing.
    pub fn is_transient(&self) -> bool {
        matches!(self, IngestError::Database(_) | IngestError::Task(_))
    }
}

impl From<csv::Error> for IngestError {
    fn from(err: csv::Error) -> Self {
        IngestError::Snapshot(err.to_string())
    }
}

/// Convenient Result type using IngestError
pub type Result<T> = std::result::Result<T, IngestError>;
