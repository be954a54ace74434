//! Place name carry-over between clustering runs.
//!
//! Clusters are rebuilt from scratch on every run, so their ids mean nothing
//! across runs. A new cluster is matched to the first previous cluster (in
//! previous result order) whose location lies within `radius_km`; if that
//! cluster had a name it is copied forward, saving a geocoding round trip.
//!
//! Two distinct places closer than the radius can swap names this way. The
//! radius is a parameter so hosts can tighten it.

use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::geo_utils::{degree_deltas, haversine_km};
use crate::{Cluster, GpsPoint};

/// Location of a previous cluster, indexed for proximity search.
#[derive(Debug, Clone)]
struct KnownPlace {
    index: usize,
    location: GpsPoint,
}

impl RTreeObject for KnownPlace {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.location.longitude, self.location.latitude])
    }
}

/// Copy names from `previous` onto unnamed clusters in `clusters`.
///
/// Returns the number of names carried forward.
pub fn preserve_location_names(
    clusters: &mut [Cluster],
    previous: &[Cluster],
    radius_km: f64,
) -> usize {
    let places: Vec<KnownPlace> = previous
        .iter()
        .enumerate()
        .filter_map(|(index, c)| c.location.map(|location| KnownPlace { index, location }))
        .collect();
    if places.is_empty() {
        return 0;
    }
    let tree = RTree::bulk_load(places);

    let mut carried = 0;
    for cluster in clusters.iter_mut() {
        if cluster.location_name.is_some() {
            continue;
        }
        let Some(location) = cluster.location else {
            continue;
        };

        let matched = first_match(&tree, &location, radius_km);
        if let Some(name) = matched.and_then(|i| previous[i].location_name.clone()) {
            debug!("[Incremental] {} keeps name '{}'", cluster.id, name);
            cluster.location_name = Some(name);
            carried += 1;
        }
    }

    carried
}

/// Lowest previous index within `radius_km` of `location`.
fn first_match(tree: &RTree<KnownPlace>, location: &GpsPoint, radius_km: f64) -> Option<usize> {
    let (lat_delta, lng_delta) = degree_deltas(location, radius_km);
    let min_lng = location.longitude - lng_delta;
    let max_lng = location.longitude + lng_delta;

    let within = |p: &&KnownPlace| haversine_km(&p.location, location) <= radius_km;

    if min_lng < -180.0 || max_lng > 180.0 {
        // Search window wraps around the antimeridian
        return tree.iter().filter(within).map(|p| p.index).min();
    }

    let envelope = AABB::from_corners(
        [min_lng, location.latitude - lat_delta],
        [max_lng, location.latitude + lat_delta],
    );
    tree.locate_in_envelope_intersecting(&envelope)
        .filter(within)
        .map(|p| p.index)
        .min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Photo;

    fn cluster(id: &str, lat: f64, lng: f64, name: Option<&str>) -> Cluster {
        Cluster {
            id: id.to_string(),
            photos: vec![Photo::new(format!("{}-p", id), 0, Some(GpsPoint::new(lat, lng)))],
            start_date: 0,
            end_date: 0,
            location: Some(GpsPoint::new(lat, lng)),
            location_name: name.map(|n| n.to_string()),
            is_vacation: false,
            days: 1,
        }
    }

    #[test]
    fn test_carries_name_within_radius() {
        let previous = vec![cluster("old", 48.8566, 2.3522, Some("Paris"))];
        let mut clusters = vec![cluster("new", 48.86, 2.36, None)];

        let carried = preserve_location_names(&mut clusters, &previous, 10.0);

        assert_eq!(carried, 1);
        assert_eq!(clusters[0].location_name.as_deref(), Some("Paris"));
    }

    #[test]
    fn test_ignores_places_outside_radius() {
        let previous = vec![cluster("old", 48.8566, 2.3522, Some("Paris"))];
        let mut clusters = vec![cluster("new", 49.0, 2.3522, None)];

        assert_eq!(preserve_location_names(&mut clusters, &previous, 10.0), 0);
        assert!(clusters[0].location_name.is_none());
    }

    #[test]
    fn test_first_previous_match_wins() {
        let previous = vec![
            cluster("first", 48.90, 2.35, None),
            cluster("second", 48.86, 2.35, Some("Paris")),
        ];
        let mut clusters = vec![cluster("new", 48.86, 2.35, None)];

        // "first" is within 10 km and comes first, but has no name
        assert_eq!(preserve_location_names(&mut clusters, &previous, 10.0), 0);
    }

    #[test]
    fn test_keeps_existing_name() {
        let previous = vec![cluster("old", 0.0, 0.0, Some("Old"))];
        let mut clusters = vec![cluster("new", 0.0, 0.0, Some("User name"))];

        preserve_location_names(&mut clusters, &previous, 10.0);
        assert_eq!(clusters[0].location_name.as_deref(), Some("User name"));
    }

    #[test]
    fn test_antimeridian() {
        let previous = vec![cluster("old", -17.0, 179.99, Some("Fiji"))];
        let mut clusters = vec![cluster("new", -17.0, -179.99, None)];

        assert_eq!(preserve_location_names(&mut clusters, &previous, 10.0), 1);
    }
}
