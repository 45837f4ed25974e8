//! Route storage and the measure model
//!
//! A [`Route`] is a named, possibly multi-part polyline. Parts are ordered by `sortnr` and
//! measures accumulate across parts in that order.

use crate::{LrsError, Result, utils};
use geo::{Coord, LineString};
use std::fmt;
use uuid::Uuid;

/// Stable identifier of a route
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct RouteId(Uuid);

impl RouteId {
    /// Fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[inline]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[inline]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RouteId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One contiguous polyline of a route
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Part {
    /// 1-based position within the route
    pub sortnr: u32,
    /// Part geometry, already direction-normalized
    pub geometry: LineString<f64>,
    /// Cached length of `geometry`
    pub length: f64,
}

impl Part {
    pub fn new(sortnr: u32, geometry: LineString<f64>) -> Self {
        let length = utils::line_length(&geometry);
        Self {
            sortnr,
            geometry,
            length,
        }
    }

    /// Start coordinate, if the part has any vertex
    #[inline]
    pub fn start(&self) -> Option<Coord<f64>> {
        self.geometry.0.first().copied()
    }

    /// End coordinate, if the part has any vertex
    #[inline]
    pub fn end(&self) -> Option<Coord<f64>> {
        self.geometry.0.last().copied()
    }
}

/// Result of projecting a position onto a route
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Projection {
    /// Position snapped onto the selected part
    pub point: Coord<f64>,
    /// Cumulative distance from the route start
    pub measure: f64,
    /// Bearing in degrees clockwise from north
    pub azimuth: f64,
    /// Part the position was projected onto
    pub sortnr: u32,
}

/// A named multi-part route with cached lengths
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Route {
    route_id: RouteId,
    name: String,
    /// Parts sorted by ascending `sortnr`
    parts: Vec<Part>,
    /// Basesystem the geometry was derived from
    basesystem_id: u32,
    valid: bool,
    length: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Route {
    /// Create a route from its parts
    ///
    /// # Arguments
    /// * `route_id` - Stable id of the route
    /// * `name` - Human key of the route (trimmed)
    /// * `basesystem_id` - Provenance of the geometry
    /// * `parts` - Parts in any order; they are sorted by `sortnr`
    ///
    /// # Returns
    /// The route, or an error if it has no parts, a part has no vertex or two parts share a sortnr
    pub fn new(
        route_id: RouteId,
        name: impl Into<String>,
        basesystem_id: u32,
        parts: Vec<Part>,
    ) -> Result<Self> {
        let name = name.into().trim().to_string();
        let parts = Self::checked_parts(&name, parts)?;
        let mut route = Self {
            route_id,
            name,
            parts,
            basesystem_id,
            valid: true,
            length: 0.0,
        };
        route.recompute_lengths();
        Ok(route)
    }

    fn checked_parts(name: &str, mut parts: Vec<Part>) -> Result<Vec<Part>> {
        if parts.is_empty() {
            return Err(LrsError::EmptyRoute(name.to_string()));
        }
        if parts.iter().any(|part| part.geometry.0.is_empty()) {
            return Err(LrsError::InvalidGeometry(format!(
                "route {name} has a part without vertices"
            )));
        }
        parts.sort_by_key(|part| part.sortnr);
        if parts.windows(2).any(|pair| pair[0].sortnr == pair[1].sortnr) {
            return Err(LrsError::InvalidGeometry(format!(
                "route {name} has duplicate part numbers"
            )));
        }
        Ok(parts)
    }

    #[inline]
    pub fn route_id(&self) -> RouteId {
        self.route_id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn basesystem_id(&self) -> u32 {
        self.basesystem_id
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    #[inline]
    pub fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Cached route length, the sum of all part lengths
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Parts in ascending `sortnr` order
    #[inline]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn part(&self, sortnr: u32) -> Option<&Part> {
        self.parts.iter().find(|part| part.sortnr == sortnr)
    }

    /// Replace all parts, e.g. after the basesystem changed
    pub fn replace_parts(&mut self, parts: Vec<Part>, basesystem_id: u32) -> Result<()> {
        self.parts = Self::checked_parts(&self.name, parts)?;
        self.basesystem_id = basesystem_id;
        self.recompute_lengths();
        Ok(())
    }

    /// Refresh cached part and route lengths from geometry
    pub fn recompute_lengths(&mut self) {
        for part in &mut self.parts {
            part.length = utils::line_length(&part.geometry);
        }
        self.length = self.parts.iter().map(|part| part.length).sum();
    }

    /// Measure at the start of a part: the summed length of all parts before it
    pub fn measure_offset(&self, sortnr: u32) -> f64 {
        self.parts
            .iter()
            .take_while(|part| part.sortnr < sortnr)
            .map(|part| part.length)
            .sum()
    }

    /// Part closest to `point`; ties go to the lowest `sortnr`
    pub fn closest_part(&self, point: Coord<f64>) -> Option<&Part> {
        let mut best: Option<(&Part, f64)> = None;
        for part in &self.parts {
            let dist = utils::distance_to_line(&part.geometry, point);
            if best.is_none_or(|(_, best_dist)| dist < best_dist) {
                best = Some((part, dist));
            }
        }
        best.map(|(part, _)| part)
    }

    /// Project a position onto the route
    ///
    /// # Arguments
    /// * `point` - Position to project
    /// * `part_hint` - Restrict the projection to this part instead of the closest one
    ///
    /// # Returns
    /// The snapped point, its measure and the local azimuth
    pub fn project(&self, point: Coord<f64>, part_hint: Option<u32>) -> Result<Projection> {
        let part = match part_hint {
            Some(sortnr) => self.part(sortnr).ok_or_else(|| LrsError::UnknownPart {
                route: self.name.clone(),
                sortnr,
            })?,
            None => self
                .closest_part(point)
                .ok_or_else(|| LrsError::EmptyRoute(self.name.clone()))?,
        };
        let fraction = utils::locate_point(&part.geometry, point);
        self.projection_at(part, fraction)
    }

    /// Position at the very end of the last part
    pub fn route_end(&self) -> Result<Projection> {
        let part = self
            .parts
            .last()
            .ok_or_else(|| LrsError::EmptyRoute(self.name.clone()))?;
        self.projection_at(part, 1.0)
    }

    fn projection_at(&self, part: &Part, fraction: f64) -> Result<Projection> {
        // Degenerate parts locate at their start
        let fraction = if part.length > 0.0 { fraction } else { 0.0 };
        let point = utils::interpolate_point(&part.geometry, fraction).ok_or_else(|| {
            LrsError::InvalidGeometry(format!("route {} part {} is empty", self.name, part.sortnr))
        })?;
        Ok(Projection {
            point,
            measure: self.measure_offset(part.sortnr) + fraction * part.length,
            azimuth: utils::azimuth_at(&part.geometry, part.length, fraction),
            sortnr: part.sortnr,
        })
    }

    /// Coordinate at a cumulative measure
    ///
    /// Measures beyond the route are clamped to its ends.
    pub fn point_at_measure(&self, measure: f64) -> Option<Coord<f64>> {
        let mut offset = 0.0;
        for part in &self.parts {
            if measure <= offset + part.length || part.sortnr == self.parts.last()?.sortnr {
                let fraction = if part.length > 0.0 {
                    (measure - offset) / part.length
                } else {
                    0.0
                };
                return utils::interpolate_point(&part.geometry, fraction);
            }
            offset += part.length;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_part_route() -> Route {
        Route::new(
            RouteId::new(),
            " R1 ",
            1,
            vec![
                Part::new(2, LineString::from(vec![(100.0, 0.0), (100.0, 50.0)])),
                Part::new(1, LineString::from(vec![(0.0, 0.0), (100.0, 0.0)])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_route_creation_sorts_parts() {
        let route = two_part_route();
        assert_eq!(route.name(), "R1");
        assert_eq!(route.parts()[0].sortnr, 1);
        assert_eq!(route.parts()[1].sortnr, 2);
        assert!((route.length() - 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_route_fails() {
        assert!(Route::new(RouteId::new(), "R", 1, Vec::new()).is_err());
    }

    #[test]
    fn test_duplicate_sortnr_fails() {
        let parts = vec![
            Part::new(1, LineString::from(vec![(0.0, 0.0), (1.0, 0.0)])),
            Part::new(1, LineString::from(vec![(1.0, 0.0), (2.0, 0.0)])),
        ];
        assert!(Route::new(RouteId::new(), "R", 1, parts).is_err());
    }

    #[test]
    fn test_project_selects_closest_part() {
        let route = two_part_route();
        let p = route.project(Coord { x: 103.0, y: 20.0 }, None).unwrap();
        assert_eq!(p.sortnr, 2);
        assert!((p.measure - 120.0).abs() < 1e-9);
        assert!((p.point.x - 100.0).abs() < 1e-9);
        assert!((p.azimuth - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_with_part_hint() {
        let route = two_part_route();
        let p = route.project(Coord { x: 103.0, y: 20.0 }, Some(1)).unwrap();
        assert_eq!(p.sortnr, 1);
        assert!((p.measure - 100.0).abs() < 1e-9);
        assert!((p.azimuth - 90.0).abs() < 1e-9);
        assert!(route.project(Coord { x: 0.0, y: 0.0 }, Some(7)).is_err());
    }

    #[test]
    fn test_route_end() {
        let route = two_part_route();
        let end = route.route_end().unwrap();
        assert!((end.measure - 150.0).abs() < 1e-9);
        assert_eq!(end.point, Coord { x: 100.0, y: 50.0 });
    }

    #[test]
    fn test_projection_round_trip() {
        let route = two_part_route();
        for p in [
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 42.5, y: 0.0 },
            Coord { x: 100.0, y: 12.25 },
            Coord { x: 100.0, y: 50.0 },
        ] {
            let projection = route.project(p, None).unwrap();
            let back = route.point_at_measure(projection.measure).unwrap();
            assert!(utils::distance(back, p) < 1e-9);
        }
    }

    #[test]
    fn test_measure_is_monotonic_across_parts() {
        let route = two_part_route();
        let last_on_first = route.project(Coord { x: 99.9, y: 0.0 }, Some(1)).unwrap();
        let first_on_second = route.project(Coord { x: 100.0, y: 0.1 }, Some(2)).unwrap();
        assert!(first_on_second.measure >= last_on_first.measure);
    }

    #[test]
    fn test_zero_length_part_is_degenerate() {
        let route = Route::new(
            RouteId::new(),
            "Z",
            1,
            vec![Part::new(1, LineString::from(vec![(5.0, 5.0), (5.0, 5.0)]))],
        )
        .unwrap();
        let p = route.project(Coord { x: 9.0, y: 9.0 }, None).unwrap();
        assert_eq!(p.measure, 0.0);
        assert_eq!(p.azimuth, 0.0);
        assert!(route.route_end().unwrap().measure.abs() < f64::EPSILON);
    }

    #[test]
    fn test_recompute_lengths_after_replace() {
        let mut route = two_part_route();
        route
            .replace_parts(
                vec![Part::new(1, LineString::from(vec![(0.0, 0.0), (90.0, 0.0)]))],
                2,
            )
            .unwrap();
        assert!((route.length() - 90.0).abs() < 1e-9);
        assert_eq!(route.basesystem_id(), 2);
    }
}
