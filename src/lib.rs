//! # Trip Cluster
//!
//! Geo-temporal clustering of geotagged, timestamped photos into trips.
//!
//! This library provides:
//! - Location inference for photos missing GPS data
//! - Day bucketing and greedy day-to-trip aggregation
//! - Fixed-point consolidation of clusters that describe the same trip
//! - A stateful engine with initial / load-more / refresh modes that keeps
//!   place names across re-runs
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel distance decoration with rayon
//! - **`http`** - Enable the Nominatim reverse geocoder
//! - **`persistence`** - Enable the SQLite cluster store
//! - **`cli`** - Build the `trip-cluster-cli` debug tool
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trip_cluster::{cluster_photos, ClusterConfig, GpsPoint, Photo};
//!
//! const HOUR: i64 = 3_600_000;
//! let start = 1_717_200_000_000; // 2024-06-01
//!
//! let photos: Vec<Photo> = (0..5)
//!     .map(|i| Photo::new(format!("p{}", i), start + i * 10 * HOUR, Some(GpsPoint::new(48.8566, 2.3522))))
//!     .collect();
//!
//! let clusters = cluster_photos(&photos, &ClusterConfig::default());
//! assert_eq!(clusters.len(), 1);
//! assert!(clusters[0].is_vacation);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TripClusterError};

// Geographic utilities (haversine, centroids, distance from home)
pub mod geo_utils;
pub use geo_utils::{annotate_distance_from_home, haversine_km};

// Location inference for photos without GPS data
pub mod inference;
pub use inference::infer_locations;

// Calendar-day bucketing
pub mod buckets;
pub use buckets::{bucket_by_day, DayBucket};

// Greedy day-to-trip aggregation and representative location selection
pub mod aggregation;
pub use aggregation::{aggregate_days, representative_location};

// Fixed-point cluster consolidation
pub mod consolidate;
pub use consolidate::consolidate_clusters;

// Full clustering pipeline, finalization and ordering
pub mod pipeline;
pub use pipeline::{cluster_photos, finalize_cluster, sort_clusters};

// Place name carry-over between runs
pub mod incremental;
pub use incremental::preserve_location_names;

// Stateful engine owned by the host session
pub mod engine;
pub use engine::{EngineStats, RefreshOutcome, TripEngine};

// Persisted-cache representation
pub mod cache;
pub use cache::{CachedCluster, ClusterCache};

// LRU cache for place names
pub mod lru_cache;

// Reverse geocoding collaborator boundary
pub mod geocode;
pub use geocode::{geocode_clusters, GeocodeOptions, GeocodeStats, PlaceNameCache, ReverseGeocoder};

// Nominatim reverse geocoder
#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "http")]
pub use http::{NominatimConfig, NominatimGeocoder};

// SQLite store for the cluster cache
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::ClusterStore;

// ============================================================================
// Constants
// ============================================================================

/// Identifier of the single cluster holding photos without a location.
pub const UNKNOWN_LOCATION_ID: &str = "unknown-location";

/// Display name of the unknown-location cluster.
pub const UNKNOWN_LOCATION_NAME: &str = "Unknown Location";

/// Milliseconds in one day.
pub const MS_PER_DAY: i64 = 86_400_000;

/// Milliseconds in one hour.
pub const MS_PER_HOUR: i64 = 3_600_000;

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude in decimal degrees.
///
/// # Example
/// ```
/// use trip_cluster::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A photo record as enumerated by the host.
///
/// Only `location`, `distance_from_home` and `location_inferred` are ever
/// derived by this crate; everything else is owned by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Opaque, unique identifier
    pub id: String,
    /// Creation instant in milliseconds since the Unix epoch
    pub creation_time: i64,
    /// Observed or inferred location
    #[serde(default)]
    pub location: Option<GpsPoint>,
    /// Distance from the home point in kilometers
    #[serde(default)]
    pub distance_from_home: Option<f64>,
    /// True if `location` was filled in by location inference
    #[serde(default)]
    pub location_inferred: bool,
}

impl Photo {
    /// Create a photo with an observed (or absent) location.
    pub fn new(id: impl Into<String>, creation_time: i64, location: Option<GpsPoint>) -> Self {
        Self {
            id: id.into(),
            creation_time,
            location,
            distance_from_home: None,
            location_inferred: false,
        }
    }

    /// Location that was actually observed, ignoring inferred values.
    pub fn observed_location(&self) -> Option<GpsPoint> {
        if self.location_inferred {
            None
        } else {
            self.location
        }
    }
}

/// A trip cluster: a contiguous stretch of photos taken around one place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Synthetic sequence id, or [`UNKNOWN_LOCATION_ID`]
    pub id: String,
    /// Photos sorted by creation time (never empty)
    pub photos: Vec<Photo>,
    /// Start of the first day (ms since epoch)
    pub start_date: i64,
    /// Start of the last day (ms since epoch)
    pub end_date: i64,
    /// Representative location, absent only for the unknown-location cluster
    pub location: Option<GpsPoint>,
    /// Human readable place name (set by geocoding or by the user)
    pub location_name: Option<String>,
    /// True if the cluster holds at least `min_vacation_photos` photos
    pub is_vacation: bool,
    /// Inclusive day span
    pub days: u32,
}

impl Cluster {
    /// Whether this is the reserved unknown-location cluster.
    pub fn is_unknown_location(&self) -> bool {
        self.id == UNKNOWN_LOCATION_ID
    }

    /// Photo IDs in cluster order.
    pub fn photo_ids(&self) -> Vec<String> {
        self.photos.iter().map(|p| p.id.clone()).collect()
    }

    /// Number of photos in the cluster.
    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }
}

/// Configuration for the clustering pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Maximum distance between a day centroid and a cluster location
    /// for the day to join the cluster, and between day centroids that
    /// vote for the representative location.
    /// Default: 50.0 km
    pub cluster_radius_km: f64,

    /// Maximum gap in days between a cluster's last day and the next day.
    /// Default: 1
    pub max_day_gap: u32,

    /// Maximum distance between two clusters for consolidation.
    /// Default: 50.0 km
    pub merge_radius_km: f64,

    /// Days added to both ends of each cluster's date range before the
    /// consolidation overlap test, so ranges up to twice this far apart merge.
    /// Default: 1
    pub merge_window_days: u32,

    /// Maximum time between a photo and the neighbor it inherits a location from.
    /// Default: 4 hours
    pub inference_window_ms: i64,

    /// Neighbors further apart than this are treated as "in transit" and no location is inferred.
    /// Default: 48.0 km
    pub inference_max_spread_km: f64,

    /// Radius within which a previous cluster's name is carried forward.
    /// Default: 10.0 km
    pub name_match_radius_km: f64,

    /// Minimum photo count for a cluster to be considered a vacation.
    /// Default: 3
    pub min_vacation_photos: usize,

    /// Offset from UTC used to decide calendar days.
    /// Default: 0 (UTC)
    pub utc_offset_seconds: i32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_radius_km: 50.0,
            max_day_gap: 1,
            merge_radius_km: 50.0,
            merge_window_days: 1,
            inference_window_ms: 4 * MS_PER_HOUR,
            inference_max_spread_km: 48.0,
            name_match_radius_km: 10.0,
            min_vacation_photos: 3,
            utc_offset_seconds: 0,
        }
    }
}

impl ClusterConfig {
    /// Check that all thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        let radii = [
            ("cluster_radius_km", self.cluster_radius_km),
            ("merge_radius_km", self.merge_radius_km),
            ("inference_max_spread_km", self.inference_max_spread_km),
            ("name_match_radius_km", self.name_match_radius_km),
        ];
        for (name, value) in radii {
            if !value.is_finite() || value < 0.0 {
                return Err(TripClusterError::InvalidConfig {
                    message: format!("{} must be a non-negative number, got {}", name, value),
                });
            }
        }
        if self.inference_window_ms <= 0 {
            return Err(TripClusterError::InvalidConfig {
                message: "inference_window_ms must be positive".to_string(),
            });
        }
        if self.utc_offset_seconds.abs() > 18 * 3600 {
            return Err(TripClusterError::InvalidConfig {
                message: format!(
                    "utc_offset_seconds must be within +/-18h, got {}",
                    self.utc_offset_seconds
                ),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(51.5074, -0.1278).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_observed_location_ignores_inferred() {
        let mut photo = Photo::new("a", 0, Some(GpsPoint::new(1.0, 2.0)));
        assert_eq!(photo.observed_location(), Some(GpsPoint::new(1.0, 2.0)));

        photo.location_inferred = true;
        assert_eq!(photo.observed_location(), None);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = ClusterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.inference_window_ms, 14_400_000);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let config = ClusterConfig {
            merge_radius_km: -1.0,
            ..ClusterConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(TripClusterError::InvalidConfig { .. })
        ));

        let config = ClusterConfig {
            utc_offset_seconds: 20 * 3600,
            ..ClusterConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_json() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"cluster_radius_km": 25.0}"#).unwrap();
        assert_eq!(config.cluster_radius_km, 25.0);
        assert_eq!(config.max_day_gap, 1);
    }
}
