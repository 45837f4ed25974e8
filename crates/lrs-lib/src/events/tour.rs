//! Tour events: ordered parts spanning one or more routes
//!
//! A tour is an event name. Each [`TourPart`] covers a measure interval on one route and owns
//! two [`TourEndpoint`]s; `from_point` always sits at the lower measure, and
//! `route_direction` tells whether the tour travels with the route's measures there.

use super::{EventClassKind, EventNameRegistry, SyncAction, SyncStats, Synchronize};
use crate::approval::{ApprovalState, ContinuityIssue, IssueKind, PendingEntry};
use crate::log::LogSink;
use crate::{LrsError, Projection, Result, Route, RouteId, overlaps};
use chrono::{DateTime, Utc};
use geo::Coord;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Endpoint geometry of a tour part
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TourEndpoint {
    pub uuid: Uuid,
    pub point: Coord<f64>,
    pub azimuth: f64,
    pub approval: ApprovalState,
}

/// One part of a tour on one route
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TourPart {
    pub uuid: Uuid,
    /// Uuid of the tour name
    pub tour_ref: Uuid,
    pub route_id: RouteId,
    /// 1-based position within the tour
    pub sortnr: u32,
    pub from_measure: f64,
    pub to_measure: f64,
    /// Endpoint at `from_measure`
    pub from_point: Uuid,
    /// Endpoint at `to_measure`
    pub to_point: Uuid,
    /// Whether the tour travels towards increasing measures on this part
    pub route_direction: bool,
}

/// Which end of a part an endpoint is
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointKind {
    From,
    To,
}

/// Measure interval an endpoint may be moved within
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveBounds {
    pub min: f64,
    pub max: f64,
    /// Measure of the other endpoint of the same part
    pub same: f64,
}

/// A class of tour events
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TourEventClass {
    name: String,
    names: EventNameRegistry,
    endpoints: BTreeMap<Uuid, TourEndpoint>,
    parts: Vec<TourPart>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TourEventClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn names(&self) -> &EventNameRegistry {
        &self.names
    }

    #[inline]
    pub fn names_mut(&mut self) -> &mut EventNameRegistry {
        &mut self.names
    }

    #[inline]
    pub fn parts(&self) -> &[TourPart] {
        &self.parts
    }

    pub fn part(&self, uuid: Uuid) -> Option<&TourPart> {
        self.parts.iter().find(|part| part.uuid == uuid)
    }

    pub fn endpoint(&self, uuid: Uuid) -> Option<&TourEndpoint> {
        self.endpoints.get(&uuid)
    }

    /// Parts of a tour ordered by sortnr
    pub fn tour_parts(&self, tour_ref: Uuid) -> Vec<&TourPart> {
        let mut parts: Vec<&TourPart> = self
            .parts
            .iter()
            .filter(|part| part.tour_ref == tour_ref)
            .collect();
        parts.sort_by_key(|part| part.sortnr);
        parts
    }

    /// Register a new tour name
    pub fn add_tour(&mut self, name: &str) -> Result<Uuid> {
        let id = self.names.add(name)?;
        Ok(self.names.require(id)?.uuid)
    }

    fn require_name(&self, tour_ref: Uuid) -> Result<()> {
        self.names
            .by_uuid(tour_ref)
            .map(|_| ())
            .ok_or_else(|| LrsError::UnknownEventName(tour_ref.to_string()))
    }

    fn new_endpoint(projection: &Projection, approval: ApprovalState) -> TourEndpoint {
        TourEndpoint {
            uuid: Uuid::new_v4(),
            point: projection.point,
            azimuth: projection.azimuth,
            approval,
        }
    }

    /// Parts of the same tour on the same route, ordered by measure
    fn siblings(&self, tour_ref: Uuid, route_id: RouteId) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.parts.len())
            .filter(|&i| self.parts[i].tour_ref == tour_ref && self.parts[i].route_id == route_id)
            .collect();
        indices.sort_by(|&a, &b| {
            self.parts[a]
                .from_measure
                .total_cmp(&self.parts[b].from_measure)
        });
        indices
    }

    fn check_overlap(&self, tour_ref: Uuid, route_id: RouteId, from: f64, to: f64, tolerance: f64) -> Result<()> {
        for index in self.siblings(tour_ref, route_id) {
            let other = &self.parts[index];
            if overlaps(from, other.from_measure, to, other.to_measure, tolerance) {
                return Err(LrsError::OverlapRejected(format!(
                    "{:.3} - {:.3} overlaps part {} ({:.3} - {:.3})",
                    from, to, other.sortnr, other.from_measure, other.to_measure
                )));
            }
        }
        Ok(())
    }

    fn push_part(
        &mut self,
        tour_ref: Uuid,
        route_id: RouteId,
        sortnr: u32,
        (low, high): (&Projection, &Projection),
        route_direction: bool,
        now: DateTime<Utc>,
    ) -> Uuid {
        let from = Self::new_endpoint(low, ApprovalState::Approved(now));
        let to = Self::new_endpoint(high, ApprovalState::Approved(now));
        let part = TourPart {
            uuid: Uuid::new_v4(),
            tour_ref,
            route_id,
            sortnr,
            from_measure: low.measure,
            to_measure: high.measure,
            from_point: from.uuid,
            to_point: to.uuid,
            route_direction,
        };
        let uuid = part.uuid;
        self.endpoints.insert(from.uuid, from);
        self.endpoints.insert(to.uuid, to);
        self.parts.push(part);
        uuid
    }

    /// Add a part at the end of a tour
    ///
    /// # Arguments
    /// * `first` - Where the tour enters the route
    /// * `second` - Where the tour leaves the route
    ///
    /// # Returns
    /// Uuid of the new part
    pub fn insert(
        &mut self,
        route: &Route,
        tour_ref: Uuid,
        first: Coord<f64>,
        second: Coord<f64>,
        tolerance: f64,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.require_name(tour_ref)?;
        let p1 = route.project(first, None)?;
        let p2 = route.project(second, None)?;
        if (p1.measure - p2.measure).abs() <= tolerance {
            return Err(LrsError::EditRejected("Invalid Tour Part".into()));
        }
        let route_direction = p1.measure < p2.measure;
        let (low, high) = if route_direction { (&p1, &p2) } else { (&p2, &p1) };
        self.check_overlap(tour_ref, route.route_id(), low.measure, high.measure, tolerance)?;
        let sortnr = self
            .parts
            .iter()
            .filter(|part| part.tour_ref == tour_ref)
            .map(|part| part.sortnr)
            .max()
            .unwrap_or(0)
            + 1;
        Ok(self.push_part(tour_ref, route.route_id(), sortnr, (low, high), route_direction, now))
    }

    /// The single part owning an endpoint, and which end it is
    pub fn part_of_endpoint(&self, endpoint: Uuid) -> Result<(usize, EndpointKind)> {
        let mut found = self.parts.iter().enumerate().flat_map(|(index, part)| {
            [
                (part.from_point == endpoint).then_some((index, EndpointKind::From)),
                (part.to_point == endpoint).then_some((index, EndpointKind::To)),
            ]
            .into_iter()
            .flatten()
        });
        match (found.next(), found.next()) {
            (Some(hit), None) => Ok(hit),
            (None, _) => Err(LrsError::InconsistentData(format!(
                "endpoint {endpoint} belongs to no tour part"
            ))),
            (Some(_), Some(_)) => Err(LrsError::InconsistentData(format!(
                "endpoint {endpoint} belongs to several tour parts"
            ))),
        }
    }

    /// Interval an endpoint may be moved within on `route`
    pub fn tour_bounds(&self, endpoint: Uuid, route: &Route) -> Result<MoveBounds> {
        let (index, kind) = self.part_of_endpoint(endpoint)?;
        let part = &self.parts[index];
        if part.route_id != route.route_id() {
            return Err(LrsError::EditRejected(
                "Move the point along the same route.".into(),
            ));
        }
        let siblings = self.siblings(part.tour_ref, part.route_id);
        let position = siblings.iter().position(|&i| i == index).unwrap_or(0);
        Ok(match kind {
            EndpointKind::From => MoveBounds {
                min: position
                    .checked_sub(1)
                    .map_or(0.0, |p| self.parts[siblings[p]].to_measure),
                max: part.to_measure,
                same: part.to_measure,
            },
            EndpointKind::To => MoveBounds {
                min: part.from_measure,
                max: siblings
                    .get(position + 1)
                    .map_or(route.length(), |&i| self.parts[i].from_measure),
                same: part.from_measure,
            },
        })
    }

    /// Move one endpoint along its route, between its neighbours
    ///
    /// Approval states are left as they are.
    pub fn move_endpoint(&mut self, endpoint: Uuid, route: &Route, point: Coord<f64>, tolerance: f64) -> Result<()> {
        let bounds = self.tour_bounds(endpoint, route)?;
        let projection = route.project(point, None)?;
        let measure = projection.measure;
        if bounds.min - measure >= tolerance || measure - bounds.max >= tolerance {
            return Err(LrsError::EditRejected(
                "An Event must be moved between existing Events.".into(),
            ));
        }
        if (measure - bounds.same).abs() <= tolerance {
            return Err(LrsError::EditRejected(
                "An Event of the same Tour Part already exists at this position.".into(),
            ));
        }
        let (index, kind) = self.part_of_endpoint(endpoint)?;
        let target = self
            .endpoints
            .get_mut(&endpoint)
            .ok_or(LrsError::UnknownEvent(endpoint))?;
        target.point = projection.point;
        target.azimuth = projection.azimuth;
        let part = &mut self.parts[index];
        match kind {
            EndpointKind::From => part.from_measure = measure,
            EndpointKind::To => part.to_measure = measure,
        }
        Ok(())
    }

    /// Continue a tour from an existing endpoint to a new point on the same route
    ///
    /// The new part gets its own endpoints: one at the existing endpoint, one at `point`.
    /// It goes before or after the existing part depending on which end was picked and on
    /// the existing part's direction; later parts of the tour move up by one.
    pub fn append(
        &mut self,
        endpoint: Uuid,
        route: &Route,
        point: Coord<f64>,
        tolerance: f64,
        now: DateTime<Utc>,
        log: &mut dyn LogSink,
    ) -> Result<Uuid> {
        let (index, kind) = self.part_of_endpoint(endpoint)?;
        let old = self.parts[index].clone();
        if old.route_id != route.route_id() {
            return Err(LrsError::EditRejected(
                "The endpoint of the part is not along the same route.".into(),
            ));
        }
        let anchor = self
            .endpoints
            .get(&endpoint)
            .ok_or(LrsError::UnknownEvent(endpoint))?;
        let start = route.project(anchor.point, None)?;
        let end = route.project(point, None)?;
        if (start.measure - end.measure).abs() <= tolerance {
            return Err(LrsError::EditRejected("Invalid Tour Part".into()));
        }
        let direction = start.measure < end.measure;

        let proposed = match (kind, old.route_direction) {
            (EndpointKind::From, true) | (EndpointKind::To, false) => old.sortnr as i64 - 1,
            (EndpointKind::From, false) | (EndpointKind::To, true) => old.sortnr as i64 + 1,
        };
        if proposed > 0 && (proposed as u32) < old.sortnr {
            log.warning(&format!(
                "Tour {}: new part takes number {proposed} and is not placed next to part {}",
                self.names.name_of(old.tour_ref),
                old.sortnr
            ));
        }
        let sortnr = proposed.max(1) as u32;
        let route_direction = if sortnr > old.sortnr { direction } else { !direction };
        if route_direction != old.route_direction {
            return Err(LrsError::EditRejected(
                "New Tour Part in reversed direction.".into(),
            ));
        }
        let (low, high) = if direction { (&start, &end) } else { (&end, &start) };
        self.check_overlap(old.tour_ref, route.route_id(), low.measure, high.measure, tolerance)?;

        for part in self
            .parts
            .iter_mut()
            .filter(|part| part.tour_ref == old.tour_ref && part.sortnr >= sortnr)
        {
            part.sortnr += 1;
        }
        Ok(self.push_part(old.tour_ref, route.route_id(), sortnr, (low, high), route_direction, now))
    }

    fn remove_part_at(&mut self, index: usize) -> TourPart {
        let part = self.parts.remove(index);
        self.endpoints.remove(&part.from_point);
        self.endpoints.remove(&part.to_point);
        for other in self
            .parts
            .iter_mut()
            .filter(|other| other.tour_ref == part.tour_ref && other.sortnr > part.sortnr)
        {
            other.sortnr -= 1;
        }
        part
    }

    /// Delete one part with its endpoints; later parts of the tour move down by one
    pub fn delete_part(&mut self, uuid: Uuid) -> Result<TourPart> {
        let index = self
            .parts
            .iter()
            .position(|part| part.uuid == uuid)
            .ok_or(LrsError::UnknownEvent(uuid))?;
        Ok(self.remove_part_at(index))
    }

    /// Delete a tour: all parts, their endpoints and the tour name
    pub fn delete_tour(&mut self, tour_ref: Uuid) -> Result<usize> {
        let id = self
            .names
            .by_uuid(tour_ref)
            .map(|entry| entry.id)
            .ok_or_else(|| LrsError::UnknownEventName(tour_ref.to_string()))?;
        let mut removed = 0;
        while let Some(index) = self.parts.iter().position(|part| part.tour_ref == tour_ref) {
            self.remove_part_at(index);
            removed += 1;
        }
        self.names.remove(id)?;
        Ok(removed)
    }

    /// Parts with invalid measures, or overlapping the previous part of the same tour
    ///
    /// Issues are reported for both endpoints of the offending part.
    pub fn measure_check(&self, route: &Route, tolerance: f64) -> Vec<ContinuityIssue> {
        let mut parts: Vec<&TourPart> = self
            .parts
            .iter()
            .filter(|part| part.route_id == route.route_id())
            .collect();
        parts.sort_by(|a, b| {
            a.tour_ref
                .cmp(&b.tour_ref)
                .then(a.from_measure.total_cmp(&b.from_measure))
        });

        let mut issues = Vec::new();
        let mut report = |part: &TourPart, kind: IssueKind| {
            let name = self.names.name_of(part.tour_ref);
            issues.push(ContinuityIssue {
                uuid: part.from_point,
                name: name.clone(),
                measure: part.from_measure,
                kind,
            });
            issues.push(ContinuityIssue {
                uuid: part.to_point,
                name,
                measure: part.to_measure,
                kind,
            });
        };
        let mut previous: Option<&TourPart> = None;
        for &part in &parts {
            if (part.to_measure - part.from_measure).abs() < tolerance
                || part.from_measure > part.to_measure
            {
                report(part, IssueKind::DegeneratePart);
            } else if let Some(prev) = previous.filter(|prev| prev.tour_ref == part.tour_ref) {
                if overlaps(
                    part.from_measure,
                    prev.from_measure,
                    part.to_measure,
                    prev.to_measure,
                    tolerance,
                ) {
                    report(part, IssueKind::OverlappingPart);
                }
            }
            previous = Some(part);
        }
        issues
    }

    /// Parts whose endpoint features are missing
    pub fn missing_endpoints(&self) -> Vec<(Uuid, EndpointKind)> {
        let mut missing = Vec::new();
        for part in &self.parts {
            if !self.endpoints.contains_key(&part.from_point) {
                missing.push((part.uuid, EndpointKind::From));
            }
            if !self.endpoints.contains_key(&part.to_point) {
                missing.push((part.uuid, EndpointKind::To));
            }
        }
        missing
    }

    /// Names of tours without parts
    pub fn unused_names(&self) -> Vec<String> {
        self.names
            .unused_names(self.parts.iter().map(|part| part.tour_ref))
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Synchronize for TourEventClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EventClassKind {
        EventClassKind::Tour
    }

    fn references_route(&self, route_id: RouteId) -> bool {
        self.parts.iter().any(|part| part.route_id == route_id)
    }

    /// Re-evaluate both endpoints of every part on `route` independently
    fn synchronize_route(&mut self, route: &Route, tolerance: f64, log: &mut dyn LogSink) -> SyncStats {
        let mut stats = SyncStats::default();
        for part in self
            .parts
            .iter_mut()
            .filter(|part| part.route_id == route.route_id())
        {
            for kind in [EndpointKind::From, EndpointKind::To] {
                let (uuid, measure) = match kind {
                    EndpointKind::From => (part.from_point, &mut part.from_measure),
                    EndpointKind::To => (part.to_point, &mut part.to_measure),
                };
                let Some(endpoint) = self.endpoints.get_mut(&uuid) else {
                    log.error(&format!(
                        "Route {}: Tour Part {} has no endpoint {uuid}",
                        route.name(),
                        part.uuid
                    ));
                    stats.failed += 1;
                    continue;
                };
                let projection = match route.project(endpoint.point, None) {
                    Ok(projection) => projection,
                    Err(err) => {
                        log.error(&format!("Route {}: {err}", route.name()));
                        stats.failed += 1;
                        continue;
                    }
                };
                let action = SyncAction::decide(endpoint.point, *measure, &projection, tolerance);
                match action {
                    SyncAction::Unchanged => {}
                    SyncAction::MeasureOnly => {
                        endpoint.azimuth = projection.azimuth;
                        *measure = projection.measure;
                    }
                    SyncAction::Relocated => {
                        endpoint.point = projection.point;
                        endpoint.azimuth = projection.azimuth;
                        endpoint.approval.reset();
                        *measure = projection.measure;
                    }
                }
                stats.record(action);
            }
        }
        stats
    }

    fn delete_route_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> usize {
        let mut removed = 0;
        while let Some(index) = self.parts.iter().position(|part| part.route_id == route_id) {
            self.remove_part_at(index);
            removed += 1;
        }
        if removed > 0 {
            log.inform(&format!("{}: {removed} Tour Parts deleted", self.name));
        }
        removed
    }

    fn approve(&mut self, uuid: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.endpoints
            .get_mut(&uuid)
            .map(|endpoint| endpoint.approval.approve(now))
            .ok_or(LrsError::UnknownEvent(uuid))
    }

    fn approve_all(&mut self, now: DateTime<Utc>) -> usize {
        self.endpoints
            .values_mut()
            .filter_map(|endpoint| endpoint.approval.approve(now).then_some(()))
            .count()
    }

    fn pending(&self) -> Vec<PendingEntry> {
        self.endpoints
            .values()
            .filter(|endpoint| endpoint.approval.is_pending())
            .filter_map(|endpoint| match self.part_of_endpoint(endpoint.uuid) {
                Ok((index, kind)) => {
                    let part = &self.parts[index];
                    Some(PendingEntry {
                        uuid: endpoint.uuid,
                        route_id: part.route_id,
                        name: self.names.name_of(part.tour_ref),
                        measure: match kind {
                            EndpointKind::From => part.from_measure,
                            EndpointKind::To => part.to_measure,
                        },
                    })
                }
                Err(err) => {
                    tracing::warn!(%err, "pending endpoint skipped");
                    None
                }
            })
            .collect()
    }

    fn continuity_issues(&self, route: &Route, tolerance: f64) -> Vec<ContinuityIssue> {
        self.measure_check(route, tolerance)
    }
}
