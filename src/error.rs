// src/error.rs

use thiserror::Error;

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or malformed caller input
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Upload larger than the configured limit
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Missing or rejected token or session
    #[error("authentication required: {0}")]
    Authentication(String),

    /// Remote platform or subprocess failure, with captured detail text
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Archive content that could not be decoded or unpacked
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound(resource.into())
    }

    pub fn authentication<S: Into<String>>(message: S) -> Self {
        Self::Authentication(message.into())
    }

    pub fn upstream<S: Into<String>>(message: S) -> Self {
        Self::Upstream(message.into())
    }

    pub fn extraction<S: Into<String>>(message: S) -> Self {
        Self::Extraction(message.into())
    }

    /// HTTP status code this error is reported with
    pub fn status_code(&self) -> u16 {
        match self {
            Error::Validation(_) | Error::Extraction(_) => 400,
            Error::Authentication(_) => 401,
            Error::NotFound(_) => 404,
            Error::PayloadTooLarge(_) => 413,
            _ => 500,
        }
    }

    /// Short label for the `error` field of JSON error bodies
    pub fn label(&self) -> &'static str {
        match self {
            Error::Validation(_) => "Invalid request",
            Error::NotFound(_) => "Not found",
            Error::PayloadTooLarge(_) => "File too large",
            Error::Authentication(_) => "Not authenticated",
            Error::Extraction(_) => "Archive extraction failed",
            Error::Upstream(_) | Error::Http(_) => "Upstream service failed",
            _ => "Internal error",
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Extraction(other.to_string()),
        }
    }
}

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Error::Config(err.to_string())
    }
}
