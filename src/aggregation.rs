//! Greedy day-to-trip aggregation.
//!
//! Day buckets are folded into clusters in date order. A day joins the
//! **first** existing cluster whose matching location is within
//! `cluster_radius_km` of the day's centroid and whose last day is at most
//! `max_day_gap` days before it; otherwise it starts a new cluster.
//!
//! The matching location is the centroid of the cluster's first day and is
//! never updated during the fold. Once all days are placed, clusters that
//! absorbed several days get a representative location: the mean of the
//! largest group of nearby day centroids, so one side trip cannot drag the
//! location away from where most days were spent.

use chrono::NaiveDate;
use log::debug;

use crate::buckets::DayBucket;
use crate::geo_utils::{haversine_km, mean_point};
use crate::{Cluster, ClusterConfig, GpsPoint, Photo};

/// A cluster under construction.
#[derive(Debug)]
struct TripBuilder {
    id: String,
    anchor: GpsPoint,
    start_date: i64,
    end_date: i64,
    last_day: NaiveDate,
    photos: Vec<Photo>,
    day_centroids: Vec<GpsPoint>,
}

impl TripBuilder {
    fn new(id: String, bucket: DayBucket) -> Self {
        Self {
            id,
            anchor: bucket.centroid,
            start_date: bucket.day_start,
            end_date: bucket.day_start,
            last_day: bucket.date,
            photos: bucket.photos,
            day_centroids: vec![bucket.centroid],
        }
    }

    fn accepts(&self, bucket: &DayBucket, config: &ClusterConfig) -> bool {
        let gap = (bucket.date - self.last_day).num_days();
        gap <= config.max_day_gap as i64
            && haversine_km(&self.anchor, &bucket.centroid) <= config.cluster_radius_km
    }

    fn absorb(&mut self, bucket: DayBucket) {
        if bucket.date > self.last_day {
            self.last_day = bucket.date;
            self.end_date = bucket.day_start;
        }
        self.day_centroids.push(bucket.centroid);
        self.photos.extend(bucket.photos);
    }

    fn build(self, config: &ClusterConfig) -> Cluster {
        let location = if self.day_centroids.len() > 1 {
            representative_location(&self.day_centroids, config.cluster_radius_km)
                .unwrap_or(self.anchor)
        } else {
            self.anchor
        };

        Cluster {
            id: self.id,
            photos: self.photos,
            start_date: self.start_date,
            end_date: self.end_date,
            location: Some(location),
            location_name: None,
            is_vacation: false,
            days: 0,
        }
    }
}

/// Fold date-sorted day buckets into clusters (first fit).
///
/// Returned clusters are not finalized: photo order, `days` and
/// `is_vacation` are settled by [`crate::finalize_cluster`].
pub fn aggregate_days(buckets: Vec<DayBucket>, config: &ClusterConfig) -> Vec<Cluster> {
    let day_count = buckets.len();
    let mut builders: Vec<TripBuilder> = Vec::new();

    for bucket in buckets {
        match builders.iter_mut().find(|b| b.accepts(&bucket, config)) {
            Some(builder) => builder.absorb(bucket),
            None => {
                let id = format!("cluster-{}", builders.len());
                builders.push(TripBuilder::new(id, bucket));
            }
        }
    }

    debug!(
        "[Aggregation] {} days folded into {} clusters",
        day_count,
        builders.len()
    );

    builders.into_iter().map(|b| b.build(config)).collect()
}

/// Mean of the largest group of nearby points.
///
/// Points are assigned in order to the nearest existing group (measured to
/// the group's current mean) if it lies within `radius_km`, otherwise they
/// open a new group. Ties in group size go to the group created first.
pub fn representative_location(points: &[GpsPoint], radius_km: f64) -> Option<GpsPoint> {
    let mut groups: Vec<(GpsPoint, Vec<GpsPoint>)> = Vec::new();

    for point in points {
        let nearest = groups
            .iter()
            .enumerate()
            .map(|(i, (center, _))| (i, haversine_km(center, point)))
            .filter(|(_, dist)| *dist <= radius_km)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((i, _)) => {
                let (center, members) = &mut groups[i];
                members.push(*point);
                if let Some(mean) = mean_point(members) {
                    *center = mean;
                }
            }
            None => groups.push((*point, vec![*point])),
        }
    }

    let mut best: Option<&(GpsPoint, Vec<GpsPoint>)> = None;
    for group in &groups {
        if best.map_or(true, |b| group.1.len() > b.1.len()) {
            best = Some(group);
        }
    }
    best.map(|(center, _)| *center)
}
