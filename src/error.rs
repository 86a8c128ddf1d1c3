//! Error types for form parsing, generation requests and downloads.

use thiserror::Error;

/// A form field that could not be turned into a valid option.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("field `{field}` expects a whole number, got {value:?}")]
    InvalidNumber { field: &'static str, value: String },
    #[error("field `{field}` must be at least {min}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
    },
}

#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("failed to read response body: {0}")]
    Body(#[from] std::io::Error),
    #[error("failed to encode options: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("generation task did not complete: {0}")]
    Join(String),
}

#[derive(Error, Debug)]
pub enum DownloadError {
    #[error("nothing has been rendered yet")]
    NothingRendered,
    #[error("download name {0:?} is not a plain file name")]
    InvalidFileName(String),
    #[error("failed to save download: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Options(#[from] OptionsError),
}
