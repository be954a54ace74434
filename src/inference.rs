//! Location inference for photos without GPS data.
//!
//! A photo without a location borrows one from the nearest located photo
//! before or after it in time, provided that neighbor is close enough in
//! time. When both neighbors qualify but are far apart from each other the
//! photo was probably taken in transit, so nothing is inferred.
//!
//! Only observed locations act as anchors. Inference does not chain: a photo
//! never inherits from another photo inferred in the same pass, so a gap
//! longer than the window stays unknown even when it is bridged by inferred
//! photos. Locations inferred by an earlier run are discarded and re-derived,
//! which makes the transform idempotent.

use log::debug;

use crate::geo_utils::haversine_km;
use crate::{ClusterConfig, Photo};

/// Sort photos by creation time (ties broken by id).
pub fn sort_by_time(photos: &mut [Photo]) {
    photos.sort_by(|a, b| {
        a.creation_time
            .cmp(&b.creation_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// Return the photos sorted by time with missing locations filled in where
/// a nearby (in time) photo allows it.
///
/// Inferred photos get `location_inferred = true` and inherit the anchor's
/// `distance_from_home`.
pub fn infer_locations(photos: &[Photo], config: &ClusterConfig) -> Vec<Photo> {
    let mut sorted: Vec<Photo> = photos.iter().cloned().map(reset_inferred).collect();
    sort_by_time(&mut sorted);

    // Positions of photos with an observed location, in time order
    let anchors: Vec<usize> = sorted
        .iter()
        .enumerate()
        .filter(|(_, p)| p.location.is_some())
        .map(|(i, _)| i)
        .collect();

    let mut assignments: Vec<(usize, usize)> = Vec::new();
    for (i, photo) in sorted.iter().enumerate() {
        if photo.location.is_some() {
            continue;
        }

        let split = anchors.partition_point(|&a| a < i);
        let prev = split.checked_sub(1).map(|k| anchors[k]);
        let next = anchors.get(split).copied();

        if let Some(source) = choose_anchor(&sorted, i, prev, next, config) {
            assignments.push((i, source));
        }
    }

    for &(target, source) in &assignments {
        let location = sorted[source].location;
        let distance = sorted[source].distance_from_home;
        let photo = &mut sorted[target];
        photo.location = location;
        photo.distance_from_home = distance;
        photo.location_inferred = true;
    }

    debug!(
        "[Inference] {} photos, {} anchors, {} locations inferred",
        sorted.len(),
        anchors.len(),
        assignments.len()
    );

    sorted
}

/// Decide which neighbor (if any) the photo at `target` inherits from.
fn choose_anchor(
    photos: &[Photo],
    target: usize,
    prev: Option<usize>,
    next: Option<usize>,
    config: &ClusterConfig,
) -> Option<usize> {
    let time = photos[target].creation_time;
    let within_window = |idx: &usize| {
        (photos[*idx].creation_time - time).abs() <= config.inference_window_ms
    };

    let prev = prev.filter(|i| within_window(i));
    let next = next.filter(|i| within_window(i));

    match (prev, next) {
        (Some(p), Some(n)) => {
            let (p_loc, n_loc) = (photos[p].location?, photos[n].location?);
            if haversine_km(&p_loc, &n_loc) > config.inference_max_spread_km {
                // Neighbors disagree: probably in transit
                return None;
            }
            let prev_gap = time - photos[p].creation_time;
            let next_gap = photos[n].creation_time - time;
            if prev_gap <= next_gap {
                Some(p)
            } else {
                Some(n)
            }
        }
        (Some(p), None) => Some(p),
        (None, Some(n)) => Some(n),
        (None, None) => None,
    }
}

fn reset_inferred(mut photo: Photo) -> Photo {
    if photo.location_inferred {
        photo.location = None;
        photo.distance_from_home = None;
        photo.location_inferred = false;
    }
    photo
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GpsPoint, MS_PER_HOUR};

    const T: i64 = 1_717_200_000_000;

    fn located(id: &str, time: i64, lat: f64, lng: f64) -> Photo {
        Photo::new(id, time, Some(GpsPoint::new(lat, lng)))
    }

    fn missing(id: &str, time: i64) -> Photo {
        Photo::new(id, time, None)
    }

    fn find<'a>(photos: &'a [Photo], id: &str) -> &'a Photo {
        photos.iter().find(|p| p.id == id).unwrap()
    }

    #[test]
    fn test_infers_when_neighbors_agree() {
        let photos = vec![
            located("a", T, 0.0, 0.0),
            missing("b", T + 2 * MS_PER_HOUR),
            located("c", T + 3 * MS_PER_HOUR, 0.0, 0.0),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        let b = find(&result, "b");
        assert_eq!(b.location, Some(GpsPoint::new(0.0, 0.0)));
        assert!(b.location_inferred);
        assert!(!find(&result, "a").location_inferred);
    }

    #[test]
    fn test_no_inference_when_neighbors_disagree() {
        let photos = vec![
            located("a", T, 0.0, 0.0),
            missing("b", T + 2 * MS_PER_HOUR),
            located("c", T + 3 * MS_PER_HOUR, 10.0, 10.0),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        let b = find(&result, "b");
        assert_eq!(b.location, None);
        assert!(!b.location_inferred);
    }

    #[test]
    fn test_picks_closer_neighbor_in_time() {
        let photos = vec![
            located("a", T, 0.0, 0.0),
            missing("b", T + 3 * MS_PER_HOUR),
            located("c", T + 4 * MS_PER_HOUR, 0.1, 0.1),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert_eq!(find(&result, "b").location, Some(GpsPoint::new(0.1, 0.1)));
    }

    #[test]
    fn test_single_neighbor_within_window() {
        let photos = vec![
            located("a", T, 5.0, 5.0),
            missing("b", T + MS_PER_HOUR),
            // Far away but outside the window, so it does not veto
            located("c", T + 10 * MS_PER_HOUR, 40.0, 40.0),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert_eq!(find(&result, "b").location, Some(GpsPoint::new(5.0, 5.0)));
    }

    #[test]
    fn test_no_neighbor_within_window() {
        let photos = vec![
            located("a", T, 5.0, 5.0),
            missing("b", T + 5 * MS_PER_HOUR),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert_eq!(find(&result, "b").location, None);
    }

    #[test]
    fn test_all_missing_stays_missing() {
        let photos = vec![missing("a", T), missing("b", T + MS_PER_HOUR)];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert!(result.iter().all(|p| p.location.is_none()));
    }

    #[test]
    fn test_scans_past_other_missing_photos() {
        let photos = vec![
            located("a", T, 1.0, 1.0),
            missing("b", T + MS_PER_HOUR),
            missing("c", T + 2 * MS_PER_HOUR),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert_eq!(find(&result, "c").location, Some(GpsPoint::new(1.0, 1.0)));
    }

    #[test]
    fn test_output_sorted_and_input_untouched() {
        let photos = vec![
            located("c", T + 2, 0.0, 0.0),
            missing("a", T),
            located("b", T + 1, 0.0, 0.0),
        ];
        let result = infer_locations(&photos, &ClusterConfig::default());
        let ids: Vec<&str> = result.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(photos[1].location, None);
    }

    #[test]
    fn test_inherits_distance_from_home() {
        let mut anchor = located("a", T, 0.0, 0.0);
        anchor.distance_from_home = Some(1234.0);
        let photos = vec![anchor, missing("b", T + MS_PER_HOUR)];
        let result = infer_locations(&photos, &ClusterConfig::default());
        assert_eq!(find(&result, "b").distance_from_home, Some(1234.0));
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let photos = vec![
            located("a", T, 0.0, 0.0),
            missing("b", T + 3 * MS_PER_HOUR),
            // Within 4h of b but not of a; b's inferred location is not an anchor
            missing("c", T + 6 * MS_PER_HOUR),
        ];
        let config = ClusterConfig::default();
        let first = infer_locations(&photos, &config);
        let second = infer_locations(&first, &config);
        assert_eq!(first, second);
        assert_eq!(find(&second, "c").location, None);
    }
}
