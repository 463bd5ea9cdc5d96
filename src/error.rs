use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EegError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid file format: {0}")]
    Format(String),

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid filter configuration: {0}")]
    Configuration(String),

    #[error("Channel index {0} out of range")]
    InvalidChannelIndex(usize),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Cannot save an empty recording")]
    EmptyRecording,

    #[error("Operation cancelled")]
    Cancelled,
}

impl EegError {
    /// Whether the failed call left its input untouched and only needs to be
    /// surfaced as a warning (bad filter parameters, too few channels).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EegError::Configuration(_) | EegError::InsufficientData(_))
    }

    /// Whether the error describes a malformed or truncated file.
    pub fn is_format_error(&self) -> bool {
        matches!(self, EegError::Format(_) | EegError::InvalidSignalCount(_))
    }
}

pub type Result<T> = std::result::Result<T, EegError>;
