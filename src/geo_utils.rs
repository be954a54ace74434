//! Geographic utilities: great-circle distance, mean coordinates and
//! distance-from-home decoration.

use geo::{Centroid, MultiPoint, Point};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{GpsPoint, Photo};

/// Mean Earth radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Below this many photos parallel decoration is not worth the overhead.
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 10_000;

/// Great-circle distance between two points in kilometers (haversine).
///
/// Invalid input (NaN) propagates to the result.
pub fn haversine_km(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let lat1 = p1.latitude.to_radians();
    let lat2 = p2.latitude.to_radians();
    let dlat = (p2.latitude - p1.latitude).to_radians();
    let dlng = (p2.longitude - p1.longitude).to_radians();

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Arithmetic mean of latitudes and longitudes.
///
/// Returns `None` for an empty slice.
pub fn mean_point(points: &[GpsPoint]) -> Option<GpsPoint> {
    let multi: MultiPoint<f64> = points
        .iter()
        .map(|p| Point::new(p.longitude, p.latitude))
        .collect();
    multi.centroid().map(|c| GpsPoint::new(c.y(), c.x()))
}

/// Set `distance_from_home` on every photo that has a location and clear it
/// on photos that don't.
pub fn annotate_distance_from_home(photos: &mut [Photo], home: &GpsPoint) {
    #[cfg(feature = "parallel")]
    {
        if photos.len() >= PARALLEL_THRESHOLD {
            photos
                .par_iter_mut()
                .for_each(|photo| decorate(photo, home));
            return;
        }
    }

    for photo in photos.iter_mut() {
        decorate(photo, home);
    }
}

fn decorate(photo: &mut Photo, home: &GpsPoint) {
    photo.distance_from_home = photo.location.map(|loc| haversine_km(&loc, home));
}

/// Approximate degree offsets covering `radius_km` around `center`.
///
/// Returns `(lat_delta, lng_delta)`. Near the poles the longitude delta
/// saturates at 360 degrees.
pub fn degree_deltas(center: &GpsPoint, radius_km: f64) -> (f64, f64) {
    let km_per_degree = EARTH_RADIUS_KM.to_radians();
    let lat_delta = radius_km / km_per_degree;
    let cos_lat = center.latitude.to_radians().cos().abs();
    let lng_delta = if cos_lat < 1e-6 {
        360.0
    } else {
        (radius_km / (km_per_degree * cos_lat)).min(360.0)
    };
    (lat_delta, lng_delta)
}
