//! Calendar-day bucketing.
//!
//! Located photos are grouped by the calendar day they were taken on (in the
//! configured UTC offset) and each day gets the mean coordinate of its photos.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};
use log::{debug, warn};

use crate::geo_utils::mean_point;
use crate::{ClusterConfig, GpsPoint, Photo};

/// One calendar day's located photos and their centroid.
#[derive(Debug, Clone)]
pub struct DayBucket {
    pub date: NaiveDate,
    /// Start of the day in milliseconds since epoch
    pub day_start: i64,
    pub photos: Vec<Photo>,
    pub centroid: GpsPoint,
}

/// Offset used for calendar days, falling back to UTC for invalid values.
pub(crate) fn day_offset(config: &ClusterConfig) -> FixedOffset {
    FixedOffset::east_opt(config.utc_offset_seconds).unwrap_or_else(|| {
        warn!(
            "[Buckets] Invalid utc_offset_seconds {}, using UTC",
            config.utc_offset_seconds
        );
        Utc.fix()
    })
}

/// Calendar date of a timestamp in the given offset.
pub fn local_date(timestamp_ms: i64, offset: &FixedOffset) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(timestamp_ms).map(|dt| dt.with_timezone(offset).date_naive())
}

/// Instant (ms since epoch) at which `date` starts in the given offset.
pub fn day_start_ms(date: NaiveDate, offset: &FixedOffset) -> i64 {
    let local_midnight = date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    local_midnight - offset.local_minus_utc() as i64 * 1000
}

/// Split time-sorted photos into day buckets (ascending by date) and the
/// photos that still have no location.
pub fn bucket_by_day(photos: &[Photo], config: &ClusterConfig) -> (Vec<DayBucket>, Vec<Photo>) {
    let offset = day_offset(config);
    let mut days: BTreeMap<NaiveDate, Vec<Photo>> = BTreeMap::new();
    let mut unlocated = Vec::new();

    for photo in photos {
        if photo.location.is_none() {
            unlocated.push(photo.clone());
            continue;
        }
        match local_date(photo.creation_time, &offset) {
            Some(date) => days.entry(date).or_default().push(photo.clone()),
            None => {
                warn!(
                    "[Buckets] Photo {} has out-of-range timestamp {}",
                    photo.id, photo.creation_time
                );
                unlocated.push(photo.clone());
            }
        }
    }

    let buckets: Vec<DayBucket> = days
        .into_iter()
        .filter_map(|(date, photos)| {
            let points: Vec<GpsPoint> = photos.iter().filter_map(|p| p.location).collect();
            let centroid = mean_point(&points)?;
            Some(DayBucket {
                date,
                day_start: day_start_ms(date, &offset),
                photos,
                centroid,
            })
        })
        .collect();

    debug!(
        "[Buckets] {} day buckets, {} photos without location",
        buckets.len(),
        unlocated.len()
    );

    (buckets, unlocated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MS_PER_HOUR;

    // 2024-06-01T00:00:00Z
    const JUNE_1: i64 = 1_717_200_000_000;

    #[test]
    fn test_groups_by_day_with_centroid() {
        let photos = vec![
            Photo::new("a", JUNE_1 + MS_PER_HOUR, Some(GpsPoint::new(10.0, 10.0))),
            Photo::new("b", JUNE_1 + 2 * MS_PER_HOUR, Some(GpsPoint::new(12.0, 14.0))),
            Photo::new("c", JUNE_1 + 30 * MS_PER_HOUR, Some(GpsPoint::new(1.0, 1.0))),
            Photo::new("d", JUNE_1 + 31 * MS_PER_HOUR, None),
        ];

        let (buckets, unlocated) = bucket_by_day(&photos, &ClusterConfig::default());

        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert_eq!(buckets[0].day_start, JUNE_1);
        assert_eq!(buckets[0].photos.len(), 2);
        assert!((buckets[0].centroid.latitude - 11.0).abs() < 1e-9);
        assert!((buckets[0].centroid.longitude - 12.0).abs() < 1e-9);
        assert_eq!(buckets[1].date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(unlocated.len(), 1);
        assert_eq!(unlocated[0].id, "d");
    }

    #[test]
    fn test_offset_moves_day_boundary() {
        // 23:00 UTC on June 1 is already June 2 at UTC+2
        let photos = vec![Photo::new(
            "a",
            JUNE_1 + 23 * MS_PER_HOUR,
            Some(GpsPoint::new(0.0, 0.0)),
        )];
        let config = ClusterConfig {
            utc_offset_seconds: 2 * 3600,
            ..ClusterConfig::default()
        };

        let (buckets, _) = bucket_by_day(&photos, &config);

        assert_eq!(buckets[0].date, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(buckets[0].day_start, JUNE_1 + 22 * MS_PER_HOUR);
    }

    #[test]
    fn test_empty_input() {
        let (buckets, unlocated) = bucket_by_day(&[], &ClusterConfig::default());
        assert!(buckets.is_empty());
        assert!(unlocated.is_empty());
    }
}
