//! Persisted-cache representation.
//!
//! Hosts persist clusters as a photo table keyed by photo id plus a cluster
//! table that references photos by id. Restoring resolves the ids against
//! the photo table and yields clusters identical to the ones saved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{OptionExt, Result};
use crate::{Cluster, GpsPoint, Photo};

/// Scalar fields of a cluster plus the ids of its photos.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCluster {
    pub id: String,
    pub photo_ids: Vec<String>,
    pub start_date: i64,
    pub end_date: i64,
    pub location: Option<GpsPoint>,
    pub location_name: Option<String>,
    pub is_vacation: bool,
    pub days: u32,
}

impl CachedCluster {
    /// Strip a cluster down to its cacheable form.
    pub fn from_cluster(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id.clone(),
            photo_ids: cluster.photo_ids(),
            start_date: cluster.start_date,
            end_date: cluster.end_date,
            location: cluster.location,
            location_name: cluster.location_name.clone(),
            is_vacation: cluster.is_vacation,
            days: cluster.days,
        }
    }

    /// Rebuild the cluster by resolving photo ids.
    pub fn resolve(&self, photos: &HashMap<String, Photo>) -> Result<Cluster> {
        let resolved = self
            .photo_ids
            .iter()
            .map(|id| photos.get(id).cloned().ok_or_missing_photo(&self.id, id))
            .collect::<Result<Vec<Photo>>>()?;

        Ok(Cluster {
            id: self.id.clone(),
            photos: resolved,
            start_date: self.start_date,
            end_date: self.end_date,
            location: self.location,
            location_name: self.location_name.clone(),
            is_vacation: self.is_vacation,
            days: self.days,
        })
    }
}

/// Everything a host needs to persist to restore an engine without
/// re-clustering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterCache {
    /// Photo table keyed by photo id
    pub photos: HashMap<String, Photo>,
    /// Clusters in presentation order
    pub clusters: Vec<CachedCluster>,
    /// Newest creation time seen so far
    pub watermark: Option<i64>,
}

impl ClusterCache {
    /// Build the cache representation for a cluster list and the full photo set.
    ///
    /// Photos that belong to clusters are always included, even if missing
    /// from `photos`.
    pub fn from_clusters(clusters: &[Cluster], photos: &[Photo], watermark: Option<i64>) -> Self {
        let mut table: HashMap<String, Photo> = photos
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        for photo in clusters.iter().flat_map(|c| c.photos.iter()) {
            // Cluster copies carry inferred locations; prefer them
            table.insert(photo.id.clone(), photo.clone());
        }

        Self {
            photos: table,
            clusters: clusters.iter().map(CachedCluster::from_cluster).collect(),
            watermark,
        }
    }

    /// Reconstruct the cluster list.
    ///
    /// Fails with `MissingPhoto` if a cluster references an id that is not
    /// in the photo table.
    pub fn restore(&self) -> Result<Vec<Cluster>> {
        self.clusters
            .iter()
            .map(|c| c.resolve(&self.photos))
            .collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TripClusterError;

    fn sample() -> (Vec<Cluster>, Vec<Photo>) {
        let mut p1 = Photo::new("p1", 10, Some(GpsPoint::new(1.0, 2.0)));
        p1.distance_from_home = Some(12.5);
        let mut p2 = Photo::new("p2", 20, Some(GpsPoint::new(1.0, 2.0)));
        p2.location_inferred = true;
        let cluster = Cluster {
            id: "cluster-0".to_string(),
            photos: vec![p1.clone(), p2.clone()],
            start_date: 0,
            end_date: 0,
            location: Some(GpsPoint::new(1.0, 2.0)),
            location_name: Some("Somewhere".to_string()),
            is_vacation: false,
            days: 1,
        };
        (vec![cluster], vec![p1, p2])
    }

    #[test]
    fn test_round_trip() {
        let (clusters, photos) = sample();
        let cache = ClusterCache::from_clusters(&clusters, &photos, Some(20));

        assert_eq!(cache.restore().unwrap(), clusters);

        let json = cache.to_json().unwrap();
        let reloaded = ClusterCache::from_json(&json).unwrap();
        assert_eq!(reloaded, cache);
        assert_eq!(reloaded.restore().unwrap(), clusters);
    }

    #[test]
    fn test_missing_photo_is_an_error() {
        let (clusters, photos) = sample();
        let mut cache = ClusterCache::from_clusters(&clusters, &photos, None);
        cache.photos.remove("p2");

        match cache.restore() {
            Err(TripClusterError::MissingPhoto {
                cluster_id,
                photo_id,
            }) => {
                assert_eq!(cluster_id, "cluster-0");
                assert_eq!(photo_id, "p2");
            }
            other => panic!("expected MissingPhoto, got {:?}", other),
        }
    }
}
