//! # Geographic Utilities
//!
//! Distance and extent helpers for location tracks.
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points, meters |
//! | [`polyline_length`] | Total length of a track, meters |
//! | [`compute_bounds`] | Bounding box of a track |
//! | [`compute_center`] | Centroid of a track |
//! | [`path_segments`] | Per-hop distance, elapsed time and speed |
//!
//! ## Example
//!
//! ```rust
//! use location_grouper::{GpsPoint, geo_utils};
//!
//! let track = vec![
//!     GpsPoint::new(37.5665, 126.9780), // Seoul City Hall
//!     GpsPoint::new(37.5700, 126.9820),
//!     GpsPoint::new(37.5759, 126.9768),
//! ];
//!
//! let length = geo_utils::polyline_length(&track);
//! assert!(length > 500.0 && length < 2_000.0);
//!
//! let bounds = geo_utils::compute_bounds(&track).unwrap();
//! assert_eq!(bounds.min_lat, 37.5665);
//! ```
//!
//! All coordinates are WGS84 degrees. Distances use the haversine formula on a
//! sphere of radius 6,371 km via the `geo` crate.

use geo::{Distance, Haversine, Point};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{Bounds, GpsPoint, LocationRecord};

const METERS_PER_KM: f64 = 1_000.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance between two points in meters.
///
/// # Example
///
/// ```rust
/// use location_grouper::{GpsPoint, geo_utils};
///
/// let seoul = GpsPoint::new(37.5665, 126.9780);
/// let busan = GpsPoint::new(35.1796, 129.0756);
///
/// let distance = geo_utils::haversine_distance(&seoul, &busan);
/// assert!((distance - 325_000.0).abs() < 5_000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a track in meters. Fewer than two points give 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Length in kilometers over consecutive pairs where both points are finite.
///
/// Pairs touching an unparseable coordinate contribute nothing; the track is
/// not re-joined across them.
pub fn track_length_km(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .filter(|w| w[0].is_finite() && w[1].is_finite())
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum::<f64>()
        / METERS_PER_KM
}

// =============================================================================
// Extent Functions
// =============================================================================

/// Bounding box of a track, or `None` for empty input.
pub fn compute_bounds(points: &[GpsPoint]) -> Option<Bounds> {
    let first = points.first()?;
    let start = Bounds {
        min_lat: first.latitude,
        max_lat: first.latitude,
        min_lng: first.longitude,
        max_lng: first.longitude,
    };

    Some(points.iter().skip(1).fold(start, |b, p| Bounds {
        min_lat: b.min_lat.min(p.latitude),
        max_lat: b.max_lat.max(p.latitude),
        min_lng: b.min_lng.min(p.longitude),
        max_lng: b.max_lng.max(p.longitude),
    }))
}

/// Arithmetic mean of the points, or `None` for empty input.
///
/// Plain averaging; adequate for the city-scale extents location logs cover.
pub fn compute_center(points: &[GpsPoint]) -> Option<GpsPoint> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some(GpsPoint::new(sum_lat / n, sum_lng / n))
}

// =============================================================================
// Path Segments
// =============================================================================

/// One hop of a drawn path between two consecutive records.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PathSegment {
    pub from: GpsPoint,
    pub to: GpsPoint,
    /// Great-circle distance in kilometers
    pub distance_km: f64,
    /// Absolute elapsed time, `None` when either timestamp did not parse
    pub duration_minutes: Option<f64>,
    /// Average speed, `None` when elapsed time is zero or unknown
    pub speed_kmh: Option<f64>,
}

impl PathSegment {
    /// Statistics for the hop from `a` to `b`.
    pub fn between(a: &LocationRecord, b: &LocationRecord) -> Self {
        let from = a.point();
        let to = b.point();
        let distance_km = haversine_distance(&from, &to) / METERS_PER_KM;

        let duration_minutes = match (a.order.instant, b.order.instant) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().abs() as f64 / 60_000.0)
            }
            _ => None,
        };
        let speed_kmh = duration_minutes
            .filter(|minutes| *minutes > 0.0)
            .map(|minutes| distance_km / (minutes / 60.0));

        Self {
            from,
            to,
            distance_km,
            duration_minutes,
            speed_kmh,
        }
    }
}

/// Segments between each consecutive pair of an already ordered track.
pub fn path_segments(records: &[LocationRecord]) -> Vec<PathSegment> {
    records
        .windows(2)
        .map(|w| PathSegment::between(&w[0], &w[1]))
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
