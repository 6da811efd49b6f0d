//! Error handling and custom error types
//!
//! Provides unified error handling across the crate using thiserror. These
//! errors describe caller mistakes, startup problems, and transport failures.
//! Per-provider failures never surface as `Error` to callers; they are turned
//! into data on `AnalysisResult::error` at the provider boundary.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported media type: {0} (expected JPEG, PNG, WebP or GIF)")]
    UnsupportedMediaType(String),

    #[error("Image is {size} bytes, limit is {limit} bytes")]
    ImageTooLarge { size: usize, limit: usize },

    #[error("Image is empty")]
    EmptyImage,

    #[error("Failed to fetch image from {url} (status {status})")]
    Fetch { url: String, status: u16 },

    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("No providers selected")]
    NoProvidersSelected,
}

impl Error {
    /// Whether the failure is worth retrying (network hiccups, 429, 503).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            Error::UnexpectedStatus { status, .. } => matches!(status, 429 | 503),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
