//! The full clustering pipeline.
//!
//! photos → location inference → day buckets → day aggregation
//! (+ representative location) → unknown-location cluster → finalization
//! → consolidation → ordering.
//!
//! The pipeline is a pure, synchronous transformation: it owns no state and
//! performs no I/O, so callers may run it on any thread.

use log::debug;

use crate::aggregation::aggregate_days;
use crate::buckets::bucket_by_day;
use crate::consolidate::consolidate_clusters;
use crate::inference::{infer_locations, sort_by_time};
use crate::{
    Cluster, ClusterConfig, Photo, MS_PER_DAY, UNKNOWN_LOCATION_ID, UNKNOWN_LOCATION_NAME,
};

/// Cluster a photo set into trips.
///
/// Input order is irrelevant. An empty input yields an empty list. Every
/// input photo appears in exactly one output cluster; photos whose location
/// cannot be observed or inferred share the single unknown-location cluster,
/// which always comes last.
pub fn cluster_photos(photos: &[Photo], config: &ClusterConfig) -> Vec<Cluster> {
    if photos.is_empty() {
        return Vec::new();
    }

    let inferred = infer_locations(photos, config);
    let (buckets, unlocated) = bucket_by_day(&inferred, config);

    let mut clusters = aggregate_days(buckets, config);
    if let Some(unknown) = unknown_location_cluster(unlocated) {
        clusters.push(unknown);
    }

    for cluster in clusters.iter_mut() {
        finalize_cluster(cluster, config);
    }

    let mut clusters = consolidate_clusters(clusters, config);
    sort_clusters(&mut clusters);

    debug!(
        "[Pipeline] {} photos clustered into {} clusters",
        photos.len(),
        clusters.len()
    );

    clusters
}

/// Build the unknown-location cluster, or `None` if every photo has a location.
pub fn unknown_location_cluster(photos: Vec<Photo>) -> Option<Cluster> {
    let start_date = photos.iter().map(|p| p.creation_time).min()?;
    let end_date = photos.iter().map(|p| p.creation_time).max()?;

    Some(Cluster {
        id: UNKNOWN_LOCATION_ID.to_string(),
        photos,
        start_date,
        end_date,
        location: None,
        location_name: Some(UNKNOWN_LOCATION_NAME.to_string()),
        is_vacation: false,
        days: 0,
    })
}

/// Sort photos by time and derive `days` and `is_vacation`.
pub fn finalize_cluster(cluster: &mut Cluster, config: &ClusterConfig) {
    sort_by_time(&mut cluster.photos);
    cluster.days = day_span(cluster.start_date, cluster.end_date);
    cluster.is_vacation = cluster.photos.len() >= config.min_vacation_photos;
}

/// Inclusive number of days between two instants: `ceil(diff / 1 day) + 1`.
pub fn day_span(start_date: i64, end_date: i64) -> u32 {
    let diff = (end_date - start_date).max(0);
    let whole_days = (diff + MS_PER_DAY - 1) / MS_PER_DAY;
    u32::try_from(whole_days + 1).unwrap_or(u32::MAX)
}

/// Order clusters by end date, newest first, with the unknown-location
/// cluster always last.
pub fn sort_clusters(clusters: &mut [Cluster]) {
    clusters.sort_by(|a, b| {
        a.is_unknown_location()
            .cmp(&b.is_unknown_location())
            .then_with(|| b.end_date.cmp(&a.end_date))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GpsPoint, MS_PER_HOUR};

    // 2024-06-01T00:00:00Z
    const JUNE_1: i64 = 1_717_200_000_000;

    #[test]
    fn test_empty_input() {
        assert!(cluster_photos(&[], &ClusterConfig::default()).is_empty());
    }

    #[test]
    fn test_day_span() {
        assert_eq!(day_span(JUNE_1, JUNE_1), 1);
        assert_eq!(day_span(JUNE_1, JUNE_1 + 2 * MS_PER_DAY), 3);
        assert_eq!(day_span(JUNE_1, JUNE_1 + MS_PER_HOUR), 2);
        assert_eq!(day_span(JUNE_1 + MS_PER_DAY, JUNE_1), 1);
    }

    #[test]
    fn test_unknown_cluster_spans_photo_times() {
        let photos = vec![
            Photo::new("b", JUNE_1 + 5 * MS_PER_HOUR, None),
            Photo::new("a", JUNE_1 + MS_PER_HOUR, None),
        ];
        let cluster = unknown_location_cluster(photos).unwrap();
        assert_eq!(cluster.start_date, JUNE_1 + MS_PER_HOUR);
        assert_eq!(cluster.end_date, JUNE_1 + 5 * MS_PER_HOUR);
        assert_eq!(cluster.location_name.as_deref(), Some(UNKNOWN_LOCATION_NAME));
        assert!(unknown_location_cluster(Vec::new()).is_none());
    }

    #[test]
    fn test_sort_newest_first_unknown_last() {
        let make = |id: &str, end: i64| Cluster {
            id: id.to_string(),
            photos: vec![Photo::new(format!("{}-p", id), end, Some(GpsPoint::new(0.0, 0.0)))],
            start_date: end,
            end_date: end,
            location: Some(GpsPoint::new(0.0, 0.0)),
            location_name: None,
            is_vacation: false,
            days: 1,
        };
        let mut unknown = make(UNKNOWN_LOCATION_ID, JUNE_1 + 10 * MS_PER_DAY);
        unknown.location = None;

        let mut clusters = vec![
            make("old", JUNE_1),
            unknown,
            make("new", JUNE_1 + 5 * MS_PER_DAY),
        ];
        sort_clusters(&mut clusters);

        let ids: Vec<&str> = clusters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old", UNKNOWN_LOCATION_ID]);
    }

    #[test]
    fn test_finalize_sets_vacation_flag() {
        let mut cluster = Cluster {
            id: "c".to_string(),
            photos: vec![
                Photo::new("b", JUNE_1 + 2, None),
                Photo::new("a", JUNE_1 + 1, None),
            ],
            start_date: JUNE_1,
            end_date: JUNE_1 + MS_PER_DAY,
            location: None,
            location_name: None,
            is_vacation: true,
            days: 0,
        };
        finalize_cluster(&mut cluster, &ClusterConfig::default());
        assert!(!cluster.is_vacation);
        assert_eq!(cluster.days, 2);
        assert_eq!(cluster.photos[0].id, "a");
    }
}
