//! Error types for car_price_tracker

use crate::models::ListingId;

/// Unified error type for tracker operations
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// Underlying SQLite failure; the enclosing transaction was rolled back
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// A listing with this URL is already stored
    #[error("Listing already exists for URL: {url}")]
    ConstraintViolation { url: String },
    /// Operation referenced a listing that does not exist
    #[error("Listing not found: {0}")]
    NotFound(ListingId),
    /// Candidate record carries no URL, so it cannot be keyed
    #[error("Candidate record has no listing URL")]
    MissingUrl,
    /// HTTP request failed (network error, timeout, etc.)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP error status code
    #[error("HTTP error: {0}")]
    HttpStatus(reqwest::StatusCode),
    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid runtime configuration
    #[error("Configuration error: {0}")]
    Config(String),
    /// Notification could not be delivered
    #[error("Notification failed: {0}")]
    Notification(String),
}

impl TrackerError {
    /// True for failures raised by the store itself (as opposed to I/O around it)
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            TrackerError::Database(_)
                | TrackerError::ConstraintViolation { .. }
                | TrackerError::NotFound(_)
        )
    }
}

/// Result alias for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;
