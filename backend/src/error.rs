//! Error types for the battery storage pipeline.
//!
//! - [`SnapshotError`] - Snapshot discovery and loading errors
//! - [`FetchError`] - MaStR API client errors
//! - [`ConfigError`] - Environment configuration errors
//! - [`ExportError`] - Table export errors
//! - [`FilterError`] - Rejected filter queries
//! - [`ServerError`] - HTTP layer errors
//!
//! Per-field coercion problems inside a record are not errors at all: the
//! normalizer resolves them to a missing value or a domain default.

use std::path::PathBuf;
use thiserror::Error;

// =============================================================================
// Snapshot Errors
// =============================================================================

/// Errors while locating or loading a snapshot file.
///
/// Both variants are terminal for the current load attempt.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// No file in the directory matches the snapshot naming convention.
    #[error("No battery data files found in {}. Run the fetch command first.", .dir.display())]
    NoDataAvailable { dir: PathBuf },

    /// A snapshot exists but could not be read as an array of JSON objects.
    #[error("Failed to load {}: {reason}", .path.display())]
    DataLoad { path: PathBuf, reason: String },
}

impl SnapshotError {
    pub fn data_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::DataLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Fetch Errors
// =============================================================================

/// Errors from the MaStR registry client.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Missing API key.
    #[error("Missing MASTR_API_KEY environment variable")]
    MissingApiKey,

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Transport level failure (DNS, TLS, timeout).
    #[error("Request for page {page} failed: {message}")]
    Request { page: u32, message: String },

    /// Non-success HTTP status.
    #[error("Page {page} returned HTTP {status}")]
    Status { page: u32, status: u16 },

    /// Body was not the expected JSON envelope.
    #[error("Invalid response body on page {page}: {message}")]
    InvalidBody { page: u32, message: String },

    /// Writing the snapshot file failed.
    #[error("Failed to write snapshot: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the snapshot failed.
    #[error("Failed to serialize snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

// =============================================================================
// Export Errors
// =============================================================================

/// Errors while exporting the table view.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Filter Errors
// =============================================================================

/// A filter query that cannot describe any sensible selection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FilterError {
    /// Bound is NaN or infinite.
    #[error("{field} must be a finite number")]
    NonFinite { field: &'static str },

    /// Lower bound above upper bound.
    #[error("{min_field} ({min}) is greater than {max_field} ({max})")]
    InvertedRange {
        min_field: &'static str,
        max_field: &'static str,
        min: f64,
        max: f64,
    },
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Snapshot could not be provided.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server internal error.
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<FilterError> for ServerError {
    fn from(err: FilterError) -> Self {
        ServerError::BadRequest(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
