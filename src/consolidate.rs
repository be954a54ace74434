//! Fixed-point consolidation of clusters describing the same trip.
//!
//! The day fold only looks at adjacent days and compares against each
//! cluster's first day, so it can leave several clusters for what is one
//! stay (a day trip inside a longer visit, a revisit whose windows touch).
//! This pass merges any two located clusters whose locations are within
//! `merge_radius_km` and whose date ranges overlap once each range is padded
//! by `merge_window_days` on both ends, restarting the scan after every merge until a full
//! pass merges nothing. Each merge removes a cluster, so the loop terminates.

use log::debug;

use crate::geo_utils::haversine_km;
use crate::pipeline::finalize_cluster;
use crate::{Cluster, ClusterConfig, MS_PER_DAY};

/// Whether `a` and `b` should be merged into one cluster.
pub fn should_merge(a: &Cluster, b: &Cluster, config: &ClusterConfig) -> bool {
    if a.is_unknown_location() || b.is_unknown_location() {
        return false;
    }
    let (Some(loc_a), Some(loc_b)) = (a.location, b.location) else {
        return false;
    };
    if haversine_km(&loc_a, &loc_b) > config.merge_radius_km {
        return false;
    }
    date_ranges_touch(a, b, config.merge_window_days as i64 * MS_PER_DAY)
}

/// Date ranges overlap once both are widened by `pad_ms` on each end.
fn date_ranges_touch(a: &Cluster, b: &Cluster, pad_ms: i64) -> bool {
    let (a_start, a_end) = (a.start_date - pad_ms, a.end_date + pad_ms);
    let (b_start, b_end) = (b.start_date - pad_ms, b.end_date + pad_ms);
    b_start <= a_end && a_start <= b_end
}

/// Merge `other` into `target`: union of photos, combined date range,
/// `other`'s name if `target` has none. `target` keeps its id and location.
pub fn merge_into(target: &mut Cluster, other: Cluster, config: &ClusterConfig) {
    target.photos.extend(other.photos);
    target.start_date = target.start_date.min(other.start_date);
    target.end_date = target.end_date.max(other.end_date);
    if target.location_name.is_none() {
        target.location_name = other.location_name;
    }
    finalize_cluster(target, config);
}

/// Repeatedly merge pairs of clusters until no pair qualifies.
///
/// Cluster order is preserved apart from removed clusters.
pub fn consolidate_clusters(mut clusters: Vec<Cluster>, config: &ClusterConfig) -> Vec<Cluster> {
    let initial = clusters.len();

    while let Some((i, j)) = find_mergeable_pair(&clusters, config) {
        let other = clusters.remove(j);
        debug!("[Consolidate] Merging {} into {}", other.id, clusters[i].id);
        merge_into(&mut clusters[i], other, config);
    }

    debug!(
        "[Consolidate] {} clusters consolidated into {}",
        initial,
        clusters.len()
    );

    clusters
}

/// First pair (i < j) in scan order that should be merged.
fn find_mergeable_pair(clusters: &[Cluster], config: &ClusterConfig) -> Option<(usize, usize)> {
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            if should_merge(&clusters[i], &clusters[j], config) {
                return Some((i, j));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GpsPoint, Photo, UNKNOWN_LOCATION_ID};

    // 2024-06-01T00:00:00Z
    const JUNE_1: i64 = 1_717_200_000_000;

    fn cluster(id: &str, start_day: i64, end_day: i64, lat: f64, photos: &[&str]) -> Cluster {
        let mut c = Cluster {
            id: id.to_string(),
            photos: photos
                .iter()
                .enumerate()
                .map(|(k, p)| {
                    Photo::new(
                        *p,
                        JUNE_1 + start_day * MS_PER_DAY + k as i64,
                        Some(GpsPoint::new(lat, 7.0)),
                    )
                })
                .collect(),
            start_date: JUNE_1 + start_day * MS_PER_DAY,
            end_date: JUNE_1 + end_day * MS_PER_DAY,
            location: Some(GpsPoint::new(lat, 7.0)),
            location_name: None,
            is_vacation: false,
            days: 0,
        };
        finalize_cluster(&mut c, &ClusterConfig::default());
        c
    }

    #[test]
    fn test_overlapping_nearby_clusters_merge() {
        let a = cluster("a", 0, 4, 45.0, &["a1", "a2"]);
        let b = cluster("b", 2, 2, 45.1, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, "a");
        assert_eq!(result[0].photos.len(), 3);
        assert_eq!(result[0].days, 5);
        assert!(result[0].is_vacation);
    }

    #[test]
    fn test_adjacent_ranges_merge() {
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let b = cluster("b", 2, 3, 45.0, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].start_date, JUNE_1);
        assert_eq!(result[0].end_date, JUNE_1 + 3 * MS_PER_DAY);
        assert_eq!(result[0].days, 4);
    }

    #[test]
    fn test_two_day_gap_merges() {
        // Padded ranges [May 31, Jun 3] and [Jun 3, Jun 6] meet
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let b = cluster("b", 3, 4, 45.0, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].end_date, JUNE_1 + 4 * MS_PER_DAY);
        assert_eq!(result[0].days, 5);
    }

    #[test]
    fn test_three_day_gap_stays_apart() {
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let b = cluster("b", 4, 5, 45.0, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_wider_window_reaches_further() {
        let config = ClusterConfig {
            merge_window_days: 2,
            ..ClusterConfig::default()
        };
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let b = cluster("b", 5, 6, 45.0, &["b1"]);
        let c = cluster("c", 6, 7, 45.0, &["c1"]);

        assert!(should_merge(&a, &b, &config));
        assert!(!should_merge(&a, &c, &config));
    }

    #[test]
    fn test_far_locations_stay_apart() {
        let a = cluster("a", 0, 3, 45.0, &["a1"]);
        let b = cluster("b", 1, 2, 46.0, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_transitive_merge_reaches_fixed_point() {
        // c only touches a after b has widened a's range
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let b = cluster("b", 2, 4, 45.0, &["b1"]);
        let c = cluster("c", 5, 6, 45.0, &["c1"]);

        let result = consolidate_clusters(vec![a, c, b], &ClusterConfig::default());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].photos.len(), 3);
        assert_eq!(result[0].days, 7);
    }

    #[test]
    fn test_adopts_name_from_merged_cluster() {
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let mut b = cluster("b", 1, 2, 45.0, &["b1"]);
        b.location_name = Some("Turin".to_string());

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());
        assert_eq!(result[0].location_name.as_deref(), Some("Turin"));
    }

    #[test]
    fn test_unknown_location_never_merges() {
        let a = cluster("a", 0, 1, 45.0, &["a1"]);
        let mut unknown = cluster(UNKNOWN_LOCATION_ID, 0, 1, 45.0, &["u1"]);
        unknown.location = None;

        let result = consolidate_clusters(vec![a, unknown], &ClusterConfig::default());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_merged_photos_are_time_sorted() {
        let a = cluster("a", 1, 2, 45.0, &["a1"]);
        let b = cluster("b", 0, 1, 45.0, &["b1"]);

        let result = consolidate_clusters(vec![a, b], &ClusterConfig::default());
        let ids = result[0].photo_ids();
        assert_eq!(ids, vec!["b1".to_string(), "a1".to_string()]);
    }
}
