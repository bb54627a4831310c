//! Custom error types for translation, state and pipeline operations

use std::path::PathBuf;
use thiserror::Error;

/// How a failure should be handled by whoever sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Credential problem: stop the whole job
    Auth,
    /// The request itself is wrong: fail the page, do not retry
    Request,
    /// Worth another attempt after a backoff
    Transient,
    /// Retries are spent or the failure is local: fail the page
    Page,
}

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Invalid or missing API credential
    #[error("Authentication failed ({status}): {message}")]
    AuthError {
        status: u16,
        message: String,
    },

    /// Malformed request rejected by the API
    #[error("Bad request ({status}): {message}")]
    BadRequest {
        status: u16,
        message: String,
    },

    /// Rate limit or quota exceeded
    #[error("Rate limit exceeded. Retry after {retry_after:?} seconds")]
    RateLimitError {
        retry_after: Option<u64>,
    },

    /// Server side failure
    #[error("Server error: {status} - {message}")]
    ServerError {
        status: u16,
        message: String,
    },

    /// Any other non-success status
    #[error("API error: {status} - {message}")]
    ApiError {
        status: u16,
        message: String,
    },

    /// Network error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
    },

    /// Request timeout
    #[error("Request timeout")]
    TimeoutError,

    /// Invalid response from API
    #[error("Invalid response: {message}")]
    InvalidResponseError {
        message: String,
    },

    /// Transient failures outlasted the backoff schedule
    #[error("Translation failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<TranslationError>,
    },

    /// One or more chunks of a page failed
    #[error("Translation failed for {failed_chunks} chunk(s); first failure at chunk {chunk_index}: {source}")]
    ChunkFailed {
        chunk_index: usize,
        failed_chunks: usize,
        #[source]
        source: Box<TranslationError>,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl TranslationError {
    /// Classify the error for retry and abort decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            TranslationError::AuthError { .. } => ErrorClass::Auth,
            TranslationError::BadRequest { .. } => ErrorClass::Request,
            TranslationError::RateLimitError { .. }
            | TranslationError::ServerError { .. }
            | TranslationError::NetworkError { .. }
            | TranslationError::TimeoutError
            | TranslationError::InvalidResponseError { .. } => ErrorClass::Transient,
            TranslationError::ChunkFailed { source, .. } => match source.class() {
                ErrorClass::Auth => ErrorClass::Auth,
                ErrorClass::Request => ErrorClass::Request,
                _ => ErrorClass::Page,
            },
            TranslationError::ApiError { .. }
            | TranslationError::RetriesExhausted { .. }
            | TranslationError::ConfigError { .. }
            | TranslationError::IoError(_)
            | TranslationError::JsonError(_) => ErrorClass::Page,
        }
    }

    /// True if the whole job must stop
    pub fn is_fatal_for_job(&self) -> bool {
        self.class() == ErrorClass::Auth
    }

    /// Map an HTTP status and body to the error taxonomy
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => TranslationError::AuthError { status, message },
            400 | 422 => TranslationError::BadRequest { status, message },
            429 => TranslationError::RateLimitError { retry_after: None },
            500..=599 => TranslationError::ServerError { status, message },
            _ => TranslationError::ApiError { status, message },
        }
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TranslationError::TimeoutError
        } else if let Some(status) = err.status() {
            TranslationError::from_status(status.as_u16(), err.to_string())
        } else {
            TranslationError::NetworkError {
                message: err.to_string(),
            }
        }
    }
}

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;

/// Errors from the persisted progress record
#[derive(Error, Debug)]
pub enum StateError {
    /// State file could not be read or written
    #[error("State IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// State file is not valid JSON for the current schema
    #[error("State file corrupted at {path}: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Stage result does not fit the page's current state
    #[error("Invalid transition for page {page}: {reason}")]
    InvalidTransition {
        page: u32,
        reason: String,
    },

    /// Temp file could not be moved over the state file
    #[error("Failed to persist state to {path}: {message}")]
    Persist {
        path: PathBuf,
        message: String,
    },
}

/// Errors from the OCR collaborator
#[derive(Error, Debug)]
pub enum OcrError {
    /// External tool could not be started or exited non-zero
    #[error("{tool} failed: {message}")]
    ToolFailed {
        tool: String,
        message: String,
    },

    /// PDF could not be opened or parsed
    #[error("Cannot read PDF {path}: {message}")]
    InvalidPdf {
        path: PathBuf,
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that end a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Persisted state belongs to a different version of the PDF
    #[error("State for {path} is stale (recorded checksum {recorded}, current {current}); rerun with --no-resume to start fresh")]
    StaleState {
        path: PathBuf,
        recorded: String,
        current: String,
    },

    /// Job-level translation failure (bad credential)
    #[error("Fatal translation error on page {page}: {source}")]
    Fatal {
        page: u32,
        #[source]
        source: TranslationError,
    },

    /// Page count could not be determined
    #[error(transparent)]
    Ocr(#[from] OcrError),

    /// State could not be loaded or persisted
    #[error(transparent)]
    State(#[from] StateError),

    /// Document generation failed
    #[error("Rendering {language} output failed: {message}")]
    Render {
        language: String,
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            TranslationError::from_status(403, "invalid_api_key".into()).class(),
            ErrorClass::Auth
        );
        assert_eq!(
            TranslationError::from_status(429, String::new()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TranslationError::from_status(503, String::new()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            TranslationError::from_status(400, String::new()).class(),
            ErrorClass::Request
        );
        assert_eq!(
            TranslationError::from_status(418, String::new()).class(),
            ErrorClass::Page
        );
    }

    #[test]
    fn test_chunk_failure_keeps_auth_class() {
        let err = TranslationError::ChunkFailed {
            chunk_index: 2,
            failed_chunks: 1,
            source: Box::new(TranslationError::from_status(403, String::new())),
        };
        assert!(err.is_fatal_for_job());

        let err = TranslationError::ChunkFailed {
            chunk_index: 0,
            failed_chunks: 3,
            source: Box::new(TranslationError::RetriesExhausted {
                attempts: 3,
                last: Box::new(TranslationError::TimeoutError),
            }),
        };
        assert_eq!(err.class(), ErrorClass::Page);
        assert!(err.to_string().contains("chunk 0"));
    }
}
