//! Unified error handling for the trip-cluster library.
//!
//! The clustering pipeline itself never fails: missing data ends up in the
//! unknown-location cluster. Errors only come from the surfaces around it
//! (configuration, cache reconstruction, engine edits, collaborators).

use thiserror::Error;

/// Unified error type for trip-cluster operations.
#[derive(Debug, Error)]
pub enum TripClusterError {
    /// Configuration value out of range
    #[error("Configuration error: {message}")]
    InvalidConfig { message: String },

    /// Cached cluster references a photo missing from the photo table
    #[error("Cluster '{cluster_id}' references unknown photo '{photo_id}'")]
    MissingPhoto {
        cluster_id: String,
        photo_id: String,
    },

    /// No cluster with this ID in the current result set
    #[error("Cluster '{cluster_id}' not found")]
    UnknownCluster { cluster_id: String },

    /// No photo with this ID in the engine
    #[error("Photo '{photo_id}' not found")]
    UnknownPhoto { photo_id: String },

    /// JSON (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary encoding of stored data failed
    #[error("Encoding error: {message}")]
    Encoding { message: String },

    /// Reverse geocoding failed
    #[error("Geocoding failed: {message}")]
    Geocode { message: String },

    /// HTTP/API error
    #[error("HTTP error{}: {}", status_suffix(.status_code), .message)]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Persistence/storage error
    #[cfg(feature = "persistence")]
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
}

fn status_suffix(status_code: &Option<u16>) -> String {
    status_code.map(|c| format!(" ({})", c)).unwrap_or_default()
}

/// Result type alias for trip-cluster operations.
pub type Result<T> = std::result::Result<T, TripClusterError>;

/// Extension trait for converting Option to TripClusterError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a missing photo error.
    fn ok_or_missing_photo(self, cluster_id: &str, photo_id: &str) -> Result<T>;

    /// Convert Option to Result with an unknown cluster error.
    fn ok_or_unknown_cluster(self, cluster_id: &str) -> Result<T>;

    /// Convert Option to Result with an unknown photo error.
    fn ok_or_unknown_photo(self, photo_id: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_missing_photo(self, cluster_id: &str, photo_id: &str) -> Result<T> {
        self.ok_or_else(|| TripClusterError::MissingPhoto {
            cluster_id: cluster_id.to_string(),
            photo_id: photo_id.to_string(),
        })
    }

    fn ok_or_unknown_cluster(self, cluster_id: &str) -> Result<T> {
        self.ok_or_else(|| TripClusterError::UnknownCluster {
            cluster_id: cluster_id.to_string(),
        })
    }

    fn ok_or_unknown_photo(self, photo_id: &str) -> Result<T> {
        self.ok_or_else(|| TripClusterError::UnknownPhoto {
            photo_id: photo_id.to_string(),
        })
    }
}
