//! # Trip Engine
//!
//! Stateful clustering engine owned by the host session.
//!
//! ## Architecture
//!
//! The engine holds:
//! - The accumulated photo set, deduplicated by id, newest first
//! - The current cluster list
//! - The `creation_time` watermark used by refresh
//! - An optional home point for distance decoration
//!
//! Every mode re-runs the full pipeline over the accumulated photo set and
//! then carries place names forward from the previous result, so names
//! survive even though cluster ids do not. The engine is a plain value:
//! hosts create as many as they need and persist them through
//! [`ClusterCache`].

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::ClusterCache;
use crate::error::{OptionExt, Result};
use crate::geo_utils::annotate_distance_from_home;
use crate::geocode::{geocode_clusters, GeocodeOptions, GeocodeStats, PlaceNameCache, ReverseGeocoder};
use crate::incremental::preserve_location_names;
use crate::pipeline::cluster_photos;
use crate::{Cluster, ClusterConfig, GpsPoint, Photo};

// ============================================================================
// Core Types
// ============================================================================

/// Result of [`TripEngine::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// No photo newer than the watermark; clusters were not touched
    Unchanged,
    /// New photos were added and the clusters rebuilt
    Reclustered { added: usize },
}

/// Engine statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub photo_count: u32,
    pub located_photo_count: u32,
    pub inferred_photo_count: u32,
    pub cluster_count: u32,
    pub vacation_count: u32,
    pub unnamed_cluster_count: u32,
}

// ============================================================================
// Trip Engine
// ============================================================================

/// The main stateful trip engine.
#[derive(Debug, Clone)]
pub struct TripEngine {
    // Core state
    photos: Vec<Photo>,
    photo_ids: HashSet<String>,
    clusters: Vec<Cluster>,
    watermark: Option<i64>,

    home: Option<GpsPoint>,
    config: ClusterConfig,
}

impl TripEngine {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self {
            photos: Vec::new(),
            photo_ids: HashSet::new(),
            clusters: Vec::new(),
            watermark: None,
            home: None,
            config: ClusterConfig::default(),
        }
    }

    /// Create an engine with a custom configuration.
    pub fn with_config(config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new()
        })
    }

    // ========================================================================
    // Modes
    // ========================================================================

    /// Replace the photo set with `batch` and cluster it.
    ///
    /// Names from the previous result are still carried forward.
    pub fn initial(&mut self, batch: Vec<Photo>) -> &[Cluster] {
        self.photos.clear();
        self.photo_ids.clear();
        self.watermark = None;

        let added = self.ingest(batch);
        self.recluster();

        info!(
            "[TripEngine] Initial load: {} photos -> {} clusters",
            added,
            self.clusters.len()
        );
        &self.clusters
    }

    /// Add a batch of (typically older) photos and re-cluster.
    ///
    /// Photos whose id is already known are ignored. Returns the number of
    /// photos actually added.
    pub fn load_more(&mut self, batch: Vec<Photo>) -> usize {
        let added = self.ingest(batch);
        if added > 0 {
            self.recluster();
        }

        info!(
            "[TripEngine] Load more: {} new photos, {} clusters",
            added,
            self.clusters.len()
        );
        added
    }

    /// Add photos newer than the watermark and re-cluster.
    ///
    /// Photos at or before the watermark are dropped. If nothing is left the
    /// clusters are returned as they are, without re-running the pipeline.
    pub fn refresh(&mut self, batch: Vec<Photo>) -> RefreshOutcome {
        let newer: Vec<Photo> = match self.watermark {
            Some(watermark) => batch
                .into_iter()
                .filter(|p| p.creation_time > watermark)
                .collect(),
            None => batch,
        };

        let added = self.ingest(newer);
        if added == 0 {
            debug!("[TripEngine] Refresh: nothing newer than {:?}", self.watermark);
            return RefreshOutcome::Unchanged;
        }

        self.recluster();
        info!(
            "[TripEngine] Refresh: {} new photos, {} clusters",
            added,
            self.clusters.len()
        );
        RefreshOutcome::Reclustered { added }
    }

    /// Merge a batch into the photo set. Returns the number of new photos.
    fn ingest(&mut self, batch: Vec<Photo>) -> usize {
        let mut added = 0;
        for mut photo in batch {
            if !self.photo_ids.insert(photo.id.clone()) {
                continue;
            }
            if photo.location_inferred {
                // Inference re-derives these on every run
                photo.location = None;
                photo.distance_from_home = None;
                photo.location_inferred = false;
            }
            self.watermark = Some(match self.watermark {
                Some(w) => w.max(photo.creation_time),
                None => photo.creation_time,
            });
            self.photos.push(photo);
            added += 1;
        }

        if added > 0 {
            if let Some(home) = self.home {
                annotate_distance_from_home(&mut self.photos, &home);
            }
            sort_newest_first(&mut self.photos);
        }
        added
    }

    /// Rebuild clusters from the photo set, keeping names where possible.
    fn recluster(&mut self) {
        let previous = std::mem::take(&mut self.clusters);
        let mut clusters = cluster_photos(&self.photos, &self.config);

        let carried =
            preserve_location_names(&mut clusters, &previous, self.config.name_match_radius_km);
        if carried > 0 {
            debug!("[TripEngine] Carried {} place names forward", carried);
        }

        self.clusters = clusters;
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Set the home point and recompute every photo's distance from it.
    pub fn set_home(&mut self, home: GpsPoint) {
        self.home = Some(home);
        annotate_distance_from_home(&mut self.photos, &home);
        for cluster in self.clusters.iter_mut() {
            annotate_distance_from_home(&mut cluster.photos, &home);
        }
    }

    pub fn home(&self) -> Option<GpsPoint> {
        self.home
    }

    /// Set a place name on a cluster.
    /// Pass empty string to clear the name.
    pub fn set_location_name(&mut self, cluster_id: &str, name: &str) -> Result<()> {
        let cluster = self
            .clusters
            .iter_mut()
            .find(|c| c.id == cluster_id)
            .ok_or_unknown_cluster(cluster_id)?;

        cluster.location_name = if name.is_empty() {
            None
        } else {
            Some(name.to_string())
        };
        Ok(())
    }

    /// Apply place names by cluster id. Unknown ids are skipped.
    ///
    /// Returns the number of clusters updated.
    pub fn apply_location_names(&mut self, names: &HashMap<String, String>) -> usize {
        let mut applied = 0;
        for cluster in self.clusters.iter_mut() {
            if let Some(name) = names.get(&cluster.id) {
                cluster.location_name = Some(name.clone());
                applied += 1;
            }
        }
        applied
    }

    /// Give a photo an explicit location and re-cluster.
    pub fn update_photo_location(&mut self, photo_id: &str, location: GpsPoint) -> Result<()> {
        let photo = self
            .photos
            .iter_mut()
            .find(|p| p.id == photo_id)
            .ok_or_unknown_photo(photo_id)?;

        photo.location = Some(location);
        photo.location_inferred = false;
        if let Some(home) = self.home {
            annotate_distance_from_home(std::slice::from_mut(photo), &home);
        }

        self.recluster();
        Ok(())
    }

    /// Replace the configuration and re-cluster.
    pub fn set_config(&mut self, config: ClusterConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        if !self.photos.is_empty() {
            self.recluster();
        }
        Ok(())
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    // ========================================================================
    // Geocoding
    // ========================================================================

    /// Clusters that still need a place name.
    pub fn pending_geocode(&self) -> Vec<&Cluster> {
        self.clusters
            .iter()
            .filter(|c| c.location.is_some() && c.location_name.is_none())
            .collect()
    }

    /// Name pending clusters through `geocoder`.
    pub async fn geocode<G: ReverseGeocoder>(
        &mut self,
        geocoder: &G,
        options: &GeocodeOptions,
        cache: &mut PlaceNameCache,
    ) -> GeocodeStats {
        geocode_clusters(&mut self.clusters, geocoder, options, cache).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    /// Get clusters as JSON string.
    pub fn clusters_json(&self) -> String {
        serde_json::to_string(&self.clusters).unwrap_or_else(|_| "[]".to_string())
    }

    /// Accumulated photos, newest first.
    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    /// Newest `creation_time` seen so far.
    pub fn watermark(&self) -> Option<i64> {
        self.watermark
    }

    /// Get engine statistics.
    pub fn stats(&self) -> EngineStats {
        let clustered = || self.clusters.iter().flat_map(|c| c.photos.iter());

        EngineStats {
            photo_count: self.photos.len() as u32,
            located_photo_count: clustered().filter(|p| p.location.is_some()).count() as u32,
            inferred_photo_count: clustered().filter(|p| p.location_inferred).count() as u32,
            cluster_count: self.clusters.len() as u32,
            vacation_count: self.clusters.iter().filter(|c| c.is_vacation).count() as u32,
            unnamed_cluster_count: self.pending_geocode().len() as u32,
        }
    }

    // ========================================================================
    // Cache
    // ========================================================================

    /// Snapshot the engine into its persisted form.
    pub fn to_cache(&self) -> ClusterCache {
        ClusterCache::from_clusters(&self.clusters, &self.photos, self.watermark)
    }

    /// Restore an engine from a persisted snapshot without re-clustering.
    pub fn from_cache(cache: ClusterCache, config: ClusterConfig) -> Result<Self> {
        config.validate()?;
        let clusters = cache.restore()?;

        let mut photos: Vec<Photo> = cache.photos.into_values().collect();
        sort_newest_first(&mut photos);
        let photo_ids = photos.iter().map(|p| p.id.clone()).collect();
        let watermark = cache
            .watermark
            .or_else(|| photos.first().map(|p| p.creation_time));

        info!(
            "[TripEngine] Restored {} photos, {} clusters from cache",
            photos.len(),
            clusters.len()
        );

        Ok(Self {
            photos,
            photo_ids,
            clusters,
            watermark,
            home: None,
            config,
        })
    }
}

impl Default for TripEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_newest_first(photos: &mut [Photo]) {
    photos.sort_by(|a, b| {
        b.creation_time
            .cmp(&a.creation_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// Tests
// ============================================================================
