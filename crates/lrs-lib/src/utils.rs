//! Planar geometry helpers used by the route measure model
//!
//! All computations are flat 2D Euclidean in the project's coordinate system.
//! Only polylines are supported: projection, length, interpolation and bearing.

use geo::{Coord, Distance, Euclidean, Length, LineInterpolatePoint, LineLocatePoint, LineString, Point};

/// Distance along a part used to sample the azimuth before and after a position
pub const AZIMUTH_OFFSET: f64 = 0.1;

/// Euclidean distance between two coordinates
#[inline(always)]
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    Euclidean.distance(a, b)
}

/// Total length of a polyline
#[inline]
pub fn line_length(line: &LineString<f64>) -> f64 {
    Euclidean.length(line)
}

/// Minimum distance between a point and a polyline, infinite for an empty polyline
pub fn distance_to_line(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    if line.0.is_empty() {
        return f64::INFINITY;
    }
    Euclidean.distance(&Point::from(point), line)
}

/// Fractional position (0..=1) of the point on the polyline closest to `point`
///
/// Ties resolve to the first segment in vertex order. Degenerate polylines of zero length
/// always locate at fraction 0.
pub fn locate_point(line: &LineString<f64>, point: Coord<f64>) -> f64 {
    line.line_locate_point(&Point::from(point))
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

/// Coordinate at a fractional position along the polyline
///
/// The fraction is clamped to `[0,1]`. Returns `None` for an empty polyline.
pub fn interpolate_point(line: &LineString<f64>, fraction: f64) -> Option<Coord<f64>> {
    let first = *line.0.first()?;
    if line.0.len() < 2 || line_length(line) <= 0.0 {
        return Some(first);
    }
    line.line_interpolate_point(fraction.clamp(0.0, 1.0))
        .map(|point| point.0)
}

/// Bearing from `from` to `to` in degrees clockwise from north, in `[0, 360)`
///
/// Returns `None` when both coordinates coincide.
#[inline]
pub fn azimuth(from: Coord<f64>, to: Coord<f64>) -> Option<f64> {
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    if dx == 0.0 && dy == 0.0 {
        return None;
    }
    let degrees = dx.atan2(dy).to_degrees();
    Some(if degrees < 0.0 { degrees + 360.0 } else { degrees })
}

/// Azimuth of a polyline at a fractional position
///
/// Samples two points `AZIMUTH_OFFSET` before and after the position, clamped to the
/// ends of the polyline. A zero-length polyline has azimuth 0.
pub fn azimuth_at(line: &LineString<f64>, length: f64, fraction: f64) -> f64 {
    if length <= 0.0 {
        return 0.0;
    }
    let step = AZIMUTH_OFFSET / length;
    let before = interpolate_point(line, (fraction - step).max(0.0));
    let after = interpolate_point(line, (fraction + step).min(1.0));
    match (before, after) {
        (Some(a), Some(b)) => azimuth(a, b).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Whether the polyline starts and ends on the same coordinate
#[inline]
pub fn is_closed(line: &LineString<f64>) -> bool {
    match (line.0.first(), line.0.last()) {
        (Some(first), Some(last)) => line.0.len() > 1 && first == last,
        _ => false,
    }
}

/// Hashable key for exact coordinate comparison
///
/// `-0.0` and `0.0` map to the same key.
#[inline(always)]
pub fn coord_key(coord: Coord<f64>) -> (u64, u64) {
    ((coord.x + 0.0).to_bits(), (coord.y + 0.0).to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(coords: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(coords.to_vec())
    }

    #[test]
    fn test_line_length() {
        let l = line(&[(0.0, 0.0), (3.0, 4.0), (3.0, 10.0)]);
        assert!((line_length(&l) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_locate_point_on_second_segment() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let f = locate_point(&l, Coord { x: 12.0, y: 5.0 });
        assert!((f - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_distance_to_line() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        assert!((distance_to_line(&l, Coord { x: 5.0, y: 3.0 }) - 3.0).abs() < 1e-12);
        assert!((distance_to_line(&l, Coord { x: 13.0, y: 4.0 }) - 3.0).abs() < 1e-12);
        assert_eq!(distance_to_line(&line(&[]), Coord { x: 0.0, y: 0.0 }), f64::INFINITY);
    }

    #[test]
    fn test_locate_point_tie_takes_first_segment() {
        // Out and back along the same segment
        let l = line(&[(0.0, 0.0), (10.0, 0.0), (0.0, 0.0)]);
        let f = locate_point(&l, Coord { x: 4.0, y: 1.0 });
        assert!((f - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_locate_point_degenerate_line() {
        let l = line(&[(1.0, 1.0), (1.0, 1.0)]);
        assert_eq!(locate_point(&l, Coord { x: 5.0, y: 5.0 }), 0.0);
    }

    #[test]
    fn test_interpolate_point_clamps() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0)]);
        let start = interpolate_point(&l, -1.0).unwrap();
        let end = interpolate_point(&l, 2.0).unwrap();
        let mid = interpolate_point(&l, 0.25).unwrap();
        assert_eq!(start, Coord { x: 0.0, y: 0.0 });
        assert_eq!(end, Coord { x: 10.0, y: 0.0 });
        assert!((mid.x - 2.5).abs() < 1e-12);
        assert_eq!(interpolate_point(&line(&[(3.0, 4.0)]), 0.5), Some(Coord { x: 3.0, y: 4.0 }));
        assert_eq!(interpolate_point(&line(&[]), 0.5), None);
    }

    #[test]
    fn test_azimuth_compass_directions() {
        let o = Coord { x: 0.0, y: 0.0 };
        assert!((azimuth(o, Coord { x: 0.0, y: 1.0 }).unwrap() - 0.0).abs() < 1e-12);
        assert!((azimuth(o, Coord { x: 1.0, y: 0.0 }).unwrap() - 90.0).abs() < 1e-12);
        assert!((azimuth(o, Coord { x: 0.0, y: -1.0 }).unwrap() - 180.0).abs() < 1e-12);
        assert!((azimuth(o, Coord { x: -1.0, y: 0.0 }).unwrap() - 270.0).abs() < 1e-12);
        assert!(azimuth(o, o).is_none());
    }

    #[test]
    fn test_azimuth_at_part_end_is_clamped() {
        let l = line(&[(0.0, 0.0), (10.0, 0.0)]);
        assert!((azimuth_at(&l, 10.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((azimuth_at(&l, 10.0, 0.0) - 90.0).abs() < 1e-9);
        assert_eq!(azimuth_at(&l, 0.0, 0.5), 0.0);
    }

    #[test]
    fn test_is_closed() {
        assert!(is_closed(&line(&[(0.0, 0.0), (1.0, 0.0), (0.0, 0.0)])));
        assert!(!is_closed(&line(&[(0.0, 0.0), (1.0, 0.0)])));
        assert!(!is_closed(&line(&[])));
    }

    #[test]
    fn test_coord_key_signed_zero() {
        assert_eq!(
            coord_key(Coord { x: -0.0, y: 0.0 }),
            coord_key(Coord { x: 0.0, y: -0.0 })
        );
    }
}
