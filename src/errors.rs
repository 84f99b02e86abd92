/*!
 * Error types for the ksl-review application.
 *
 * Each layer gets its own enum, defined with the thiserror crate:
 * providers report transport problems, the upload parser reports malformed
 * CSV input, and the pipeline reports request-level failures. Per-sentence
 * failures are never errors; they are recorded as attempt results.
 */

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The call did not finish inside its response-time budget
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered but returned no text
    #[error("Provider returned an empty translation")]
    EmptyResponse,
}

impl ProviderError {
    /// Classify a non-success HTTP status into the matching variant
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Classify a reqwest transport error
    pub fn from_reqwest(error: reqwest::Error, budget: Duration) -> Self {
        if error.is_timeout() {
            Self::Timeout(budget)
        } else if error.is_connect() {
            Self::ConnectionError(error.to_string())
        } else if error.is_decode() {
            Self::ParseError(error.to_string())
        } else {
            Self::RequestFailed(error.to_string())
        }
    }

    /// Coarse kind recorded alongside a transport-failure attempt
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            Self::RequestFailed(_) | Self::ApiError { .. } => TransportErrorKind::Api,
            Self::ParseError(_) => TransportErrorKind::Parse,
            Self::ConnectionError(_) => TransportErrorKind::Connection,
            Self::RateLimitExceeded(_) => TransportErrorKind::RateLimit,
            Self::AuthenticationError(_) => TransportErrorKind::Authentication,
            Self::Timeout(_) => TransportErrorKind::Timeout,
            Self::EmptyResponse => TransportErrorKind::EmptyResponse,
        }
    }
}

/// Serializable classification of a transport failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportErrorKind {
    Timeout,
    RateLimit,
    Authentication,
    Connection,
    Api,
    Parse,
    EmptyResponse,
}

/// Errors raised while turning an uploaded CSV into sentence records
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    /// The upload is not valid UTF-8
    #[error("Upload is not valid UTF-8 text")]
    NotUtf8,

    /// The upload has no lines at all
    #[error("The CSV file is empty")]
    Empty,

    /// Required header columns are absent
    #[error("Missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Every data row was skipped
    #[error("No valid data rows ({skipped} rows skipped)")]
    NoValidRows {
        /// Number of rows that could not be used
        skipped: usize,
    },

    /// The upload exceeds the configured size limit
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge {
        /// Configured limit in bytes
        limit: usize,
    },
}

/// Request-level failures of a translation run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The upload could not be parsed
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// An attempt was recorded out of order for a sentence
    #[error("Invalid attempt transition for sentence {sentence_id}: {detail}")]
    InvalidTransition {
        /// Sentence whose history was being updated
        sentence_id: String,
        /// What went wrong
        detail: String,
    },

    /// The consumer of the progress stream went away
    #[error("Progress stream consumer disconnected")]
    Cancelled,

    /// Any other internal fault of the coordinator
    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Error from a provider
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Error from upload parsing
    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),

    /// Error from the pipeline
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
