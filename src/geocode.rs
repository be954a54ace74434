//! Reverse geocoding of cluster locations.
//!
//! The crate never talks to a geocoding service directly from the
//! pipeline. Hosts hand in a [`ReverseGeocoder`] and a [`PlaceNameCache`];
//! [`geocode_clusters`] names every located, unnamed cluster with a bounded
//! number of lookups in flight.
//!
//! Lookups are keyed by the cluster location rounded to
//! `cache_precision` decimal places, so clusters sitting on the same spot
//! share one request. A failed lookup leaves the cluster unnamed and is
//! retried on the next call; only successful answers are cached.

use std::collections::HashMap;
use std::future::Future;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::lru_cache::LruCache;
use crate::{Cluster, GpsPoint};

/// Something that can turn a coordinate into a human readable place name.
///
/// `Ok(None)` means the service answered but knows no name for the point
/// (open sea, for example). Errors are treated as transient.
pub trait ReverseGeocoder {
    fn reverse_geocode(
        &self,
        point: GpsPoint,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}

/// Options for [`geocode_clusters`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocodeOptions {
    /// Maximum lookups in flight.
    /// Default: 4
    pub concurrency: usize,

    /// Decimal places kept when rounding a location into a cache key.
    /// 3 places is roughly 100 m.
    /// Default: 3
    pub cache_precision: u32,
}

impl Default for GeocodeOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            cache_precision: 3,
        }
    }
}

/// Outcome counters for one [`geocode_clusters`] call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeocodeStats {
    /// Lookups sent to the geocoder
    pub requested: usize,
    /// Distinct locations answered from the cache
    pub cache_hits: usize,
    /// Clusters that received a name
    pub named: usize,
    /// Lookups that succeeded without a name
    pub not_found: usize,
    /// Lookups that failed
    pub failed: usize,
}

/// Rounded coordinate used as a cache key.
pub type CoordinateKey = (i64, i64);

/// Round a point to `precision` decimal places.
pub fn coordinate_key(point: &GpsPoint, precision: u32) -> CoordinateKey {
    let scale = 10f64.powi(precision.min(9) as i32);
    (
        (point.latitude * scale).round() as i64,
        (point.longitude * scale).round() as i64,
    )
}

/// Place names keyed by rounded coordinate.
///
/// Owned by the host and passed to every geocoding call, so its lifetime is
/// whatever the host session's is.
#[derive(Debug)]
pub struct PlaceNameCache {
    names: LruCache<CoordinateKey, Option<String>>,
}

impl PlaceNameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            names: LruCache::new(capacity),
        }
    }

    /// Cached answer for a key. The outer `Option` is cache presence.
    pub fn get(&mut self, key: &CoordinateKey) -> Option<Option<String>> {
        self.names.get(key).cloned()
    }

    pub fn insert(&mut self, key: CoordinateKey, name: Option<String>) {
        self.names.insert(key, name);
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn clear(&mut self) {
        self.names.clear();
    }

    /// (hits, misses) of the underlying LRU.
    pub fn stats(&self) -> (u64, u64) {
        self.names.stats()
    }
}

impl Default for PlaceNameCache {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Location shared by one or more unnamed clusters.
struct PendingLookup {
    point: GpsPoint,
    cluster_indices: Vec<usize>,
}

/// Name every located cluster that has no name yet.
///
/// Named clusters and the unknown-location cluster are left untouched.
/// Failures are logged and counted; they never abort the other lookups.
pub async fn geocode_clusters<G: ReverseGeocoder>(
    clusters: &mut [Cluster],
    geocoder: &G,
    options: &GeocodeOptions,
    cache: &mut PlaceNameCache,
) -> GeocodeStats {
    let mut stats = GeocodeStats::default();

    let mut pending: HashMap<CoordinateKey, PendingLookup> = HashMap::new();
    for (index, cluster) in clusters.iter().enumerate() {
        if cluster.location_name.is_some() || cluster.is_unknown_location() {
            continue;
        }
        let Some(point) = cluster.location else {
            continue;
        };
        pending
            .entry(coordinate_key(&point, options.cache_precision))
            .or_insert_with(|| PendingLookup {
                point,
                cluster_indices: Vec::new(),
            })
            .cluster_indices
            .push(index);
    }

    if pending.is_empty() {
        return stats;
    }

    let mut lookups = Vec::with_capacity(pending.len());
    for (key, lookup) in pending {
        match cache.get(&key) {
            Some(cached) => {
                stats.cache_hits += 1;
                if let Some(name) = cached {
                    stats.named += apply_name(clusters, &lookup.cluster_indices, &name);
                }
            }
            None => lookups.push((key, lookup)),
        }
    }

    stats.requested = lookups.len();
    info!(
        "[Geocode] {} lookups ({} cache hits), concurrency {}",
        stats.requested, stats.cache_hits, options.concurrency
    );

    let results: Vec<_> = stream::iter(lookups)
        .map(|(key, lookup)| async move {
            let result = geocoder.reverse_geocode(lookup.point).await;
            (key, lookup, result)
        })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;

    for (key, lookup, result) in results {
        match result {
            Ok(Some(name)) => {
                stats.named += apply_name(clusters, &lookup.cluster_indices, &name);
                cache.insert(key, Some(name));
            }
            Ok(None) => {
                debug!(
                    "[Geocode] No name for ({:.4}, {:.4})",
                    lookup.point.latitude, lookup.point.longitude
                );
                stats.not_found += 1;
                cache.insert(key, None);
            }
            Err(e) => {
                warn!(
                    "[Geocode] Lookup failed for ({:.4}, {:.4}): {}",
                    lookup.point.latitude, lookup.point.longitude, e
                );
                stats.failed += 1;
            }
        }
    }

    info!(
        "[Geocode] Named {} clusters, {} not found, {} failed",
        stats.named, stats.not_found, stats.failed
    );

    stats
}

fn apply_name(clusters: &mut [Cluster], indices: &[usize], name: &str) -> usize {
    for &i in indices {
        clusters[i].location_name = Some(name.to_string());
    }
    indices.len()
}
