//! Continuous events: a gap-free tiling of each route by measure intervals
//!
//! Every event is stored as the point where it ends (`to_measure`). The start of an event is
//! always the end of its predecessor, and the last event ends at the route length.

use super::{EventClassKind, EventNameRegistry, SyncAction, SyncStats, Synchronize};
use crate::approval::{ApprovalState, ContinuityIssue, IssueKind, PendingEntry};
use crate::log::LogSink;
use crate::{LrsError, Result, Route, RouteId};
use chrono::{DateTime, Utc};
use geo::Coord;
use std::collections::BTreeSet;
use uuid::Uuid;

/// One interval of a continuous event class
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContinuousEvent {
    pub uuid: Uuid,
    /// Uuid of the event name
    pub event_ref: Uuid,
    pub route_id: RouteId,
    pub from_measure: f64,
    pub to_measure: f64,
    /// Position of the interval end on the route
    pub point: Coord<f64>,
    pub azimuth: f64,
    pub approval: ApprovalState,
}

/// A class of continuous events
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContinuousEventClass {
    name: String,
    names: EventNameRegistry,
    events: Vec<ContinuousEvent>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl ContinuousEventClass {
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
    pub fn events(&self) -> &[ContinuousEvent] {
        &self.events
    }

    pub fn event(&self, uuid: Uuid) -> Option<&ContinuousEvent> {
        self.events.iter().find(|event| event.uuid == uuid)
    }

    /// Indices of the events on a route, ordered by measure
    fn ordered(&self, route_id: RouteId) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.events.len())
            .filter(|&i| self.events[i].route_id == route_id)
            .collect();
        indices.sort_by(|&a, &b| {
            let (a, b) = (&self.events[a], &self.events[b]);
            a.from_measure
                .total_cmp(&b.from_measure)
                .then(a.to_measure.total_cmp(&b.to_measure))
        });
        indices
    }

    /// Events on a route, ordered by measure
    pub fn events_on(&self, route_id: RouteId) -> Vec<&ContinuousEvent> {
        self.ordered(route_id)
            .into_iter()
            .map(|i| &self.events[i])
            .collect()
    }

    fn index_of(&self, uuid: Uuid) -> Result<usize> {
        self.events
            .iter()
            .position(|event| event.uuid == uuid)
            .ok_or(LrsError::UnknownEvent(uuid))
    }

    fn require_name(&self, event_ref: Uuid) -> Result<()> {
        self.names
            .by_uuid(event_ref)
            .map(|_| ())
            .ok_or_else(|| LrsError::UnknownEventName(event_ref.to_string()))
    }

    /// Split the route at a new position
    ///
    /// The first event of a route always covers the whole route. Later inserts split the
    /// interval containing the projected position: the new event ends there and the split
    /// event starts there.
    ///
    /// # Returns
    /// Uuid of the new event, approved at `now`
    pub fn insert(
        &mut self,
        route: &Route,
        event_ref: Uuid,
        point: Coord<f64>,
        tolerance: f64,
        now: DateTime<Utc>,
    ) -> Result<Uuid> {
        self.require_name(event_ref)?;
        let order = self.ordered(route.route_id());
        if order.is_empty() {
            let end = route.route_end()?;
            let event = ContinuousEvent {
                uuid: Uuid::new_v4(),
                event_ref,
                route_id: route.route_id(),
                from_measure: 0.0,
                to_measure: end.measure,
                point: end.point,
                azimuth: end.azimuth,
                approval: ApprovalState::Approved(now),
            };
            let uuid = event.uuid;
            self.events.push(event);
            return Ok(uuid);
        }

        let projection = route.project(point, None)?;
        let measure = projection.measure;
        if measure <= tolerance {
            return Err(LrsError::EditRejected(
                "No Event at the beginning of the route allowed.".into(),
            ));
        }
        if order
            .iter()
            .any(|&i| (self.events[i].to_measure - measure).abs() <= tolerance)
        {
            return Err(LrsError::EditRejected(
                "An Event already exists at this position.".into(),
            ));
        }
        let next = order
            .iter()
            .copied()
            .find(|&i| self.events[i].to_measure > measure)
            .ok_or_else(|| {
                LrsError::EditRejected("An Event must be placed between existing Events.".into())
            })?;

        let event = ContinuousEvent {
            uuid: Uuid::new_v4(),
            event_ref,
            route_id: route.route_id(),
            from_measure: self.events[next].from_measure,
            to_measure: measure,
            point: projection.point,
            azimuth: projection.azimuth,
            approval: ApprovalState::Approved(now),
        };
        let uuid = event.uuid;
        self.events[next].from_measure = measure;
        self.events.push(event);
        Ok(uuid)
    }

    /// Move the end of an event along its route
    ///
    /// The end must stay strictly between the event start and the end of the next event.
    /// The last event of a route cannot move.
    pub fn move_event(&mut self, uuid: Uuid, route: &Route, point: Coord<f64>, tolerance: f64) -> Result<()> {
        let index = self.index_of(uuid)?;
        if self.events[index].route_id != route.route_id() {
            return Err(LrsError::EditRejected(
                "Move the point along the same route.".into(),
            ));
        }
        let projection = route.project(point, None)?;
        let measure = projection.measure;
        if measure <= tolerance {
            return Err(LrsError::EditRejected(
                "No Event at the beginning of the route allowed.".into(),
            ));
        }
        let order = self.ordered(route.route_id());
        let position = order.iter().position(|&i| i == index).ok_or_else(|| {
            LrsError::InconsistentData(format!("event {uuid} not found on its route"))
        })?;
        let Some(&next) = order.get(position + 1) else {
            return Err(LrsError::EditRejected(
                "An Event at the end of the route can not be moved.".into(),
            ));
        };
        let lower = self.events[index].from_measure + tolerance;
        let upper = self.events[next].to_measure - tolerance;
        if measure <= lower || measure >= upper {
            return Err(LrsError::EditRejected(
                "An Event must be moved between existing Events.".into(),
            ));
        }

        let event = &mut self.events[index];
        event.point = projection.point;
        event.to_measure = measure;
        event.azimuth = projection.azimuth;
        self.events[next].from_measure = measure;
        Ok(())
    }

    /// Delete an event; its successor takes over its interval
    pub fn delete(&mut self, uuid: Uuid) -> Result<ContinuousEvent> {
        let index = self.index_of(uuid)?;
        let order = self.ordered(self.events[index].route_id);
        let position = order.iter().position(|&i| i == index).ok_or_else(|| {
            LrsError::InconsistentData(format!("event {uuid} not found on its route"))
        })?;
        match order.get(position + 1) {
            Some(&next) => {
                self.events[next].from_measure = self.events[index].from_measure;
            }
            None if order.len() > 1 => {
                return Err(LrsError::EditRejected(
                    "An Event at the end of the route can not be deleted, if other Events exist along the same route."
                        .into(),
                ));
            }
            None => {}
        }
        Ok(self.events.remove(index))
    }

    /// Point an event at another name
    pub fn rename(&mut self, uuid: Uuid, event_ref: Uuid, log: &mut dyn LogSink) -> Result<()> {
        self.require_name(event_ref)?;
        let index = self.index_of(uuid)?;
        let order = self.ordered(self.events[index].route_id);
        self.events[index].event_ref = event_ref;

        if let Some(position) = order.iter().position(|&i| i == index) {
            let neighbours = [
                position.checked_sub(1).and_then(|p| order.get(p)),
                order.get(position + 1),
            ];
            if neighbours
                .into_iter()
                .flatten()
                .any(|&i| self.events[i].event_ref == event_ref)
            {
                log.inform(&format!(
                    "Neighbouring Event has the same name {}",
                    self.names.name_of(event_ref)
                ));
            }
        }
        Ok(())
    }

    /// Names no event refers to
    pub fn unused_names(&self) -> Vec<String> {
        self.names
            .unused_names(self.events.iter().map(|event| event.event_ref))
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Synchronize for ContinuousEventClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EventClassKind {
        EventClassKind::Continuous
    }

    fn references_route(&self, route_id: RouteId) -> bool {
        self.events.iter().any(|event| event.route_id == route_id)
    }

    /// Walk the route's events by ascending measure, carrying the start of each interval
    ///
    /// Interior events that collapse onto a route boundary are deleted. The last event is
    /// evaluated against the route end and always ends at the route length.
    fn synchronize_route(&mut self, route: &Route, tolerance: f64, log: &mut dyn LogSink) -> SyncStats {
        let mut stats = SyncStats::default();
        let order = self.ordered(route.route_id());
        let Some((&last, interior)) = order.split_last() else {
            return stats;
        };
        let length = route.length();
        let mut cursor = 0.0;
        let mut removed = BTreeSet::new();

        for &index in interior {
            let event = &mut self.events[index];
            let projection = match route.project(event.point, None) {
                Ok(projection) => projection,
                Err(err) => {
                    log.error(&format!("Route {}: {err}", route.name()));
                    stats.failed += 1;
                    continue;
                }
            };
            if projection.measure <= tolerance || projection.measure >= length - tolerance {
                log.warning(&format!(
                    "Route {}: Event {} lies on the route boundary and was deleted",
                    route.name(),
                    event.uuid
                ));
                removed.insert(index);
                stats.deleted += 1;
                continue;
            }
            let action = SyncAction::decide(event.point, event.to_measure, &projection, tolerance);
            match action {
                SyncAction::Unchanged => {}
                SyncAction::MeasureOnly => {
                    event.to_measure = projection.measure;
                    event.azimuth = projection.azimuth;
                }
                SyncAction::Relocated => {
                    event.point = projection.point;
                    event.to_measure = projection.measure;
                    event.azimuth = projection.azimuth;
                    event.approval.reset();
                }
            }
            event.from_measure = cursor;
            cursor = event.to_measure;
            stats.record(action);
        }

        match route.route_end() {
            Ok(end) => {
                let event = &mut self.events[last];
                let action = SyncAction::decide(event.point, event.to_measure, &end, tolerance);
                match action {
                    SyncAction::Unchanged => {}
                    SyncAction::MeasureOnly => event.azimuth = end.azimuth,
                    SyncAction::Relocated => {
                        event.point = end.point;
                        event.azimuth = end.azimuth;
                        event.approval.reset();
                    }
                }
                event.from_measure = cursor;
                event.to_measure = end.measure;
                stats.record(action);
            }
            Err(err) => {
                log.error(&format!("Route {}: {err}", route.name()));
                stats.failed += 1;
            }
        }

        if !removed.is_empty() {
            let mut index = 0;
            self.events.retain(|_| {
                let keep = !removed.contains(&index);
                index += 1;
                keep
            });
        }
        stats
    }

    fn delete_route_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> usize {
        let before = self.events.len();
        self.events.retain(|event| event.route_id != route_id);
        let removed = before - self.events.len();
        if removed > 0 {
            log.inform(&format!("{}: {removed} Events deleted", self.name));
        }
        removed
    }

    fn approve(&mut self, uuid: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.events
            .iter_mut()
            .find(|event| event.uuid == uuid)
            .map(|event| event.approval.approve(now))
            .ok_or(LrsError::UnknownEvent(uuid))
    }

    fn approve_all(&mut self, now: DateTime<Utc>) -> usize {
        self.events
            .iter_mut()
            .filter_map(|event| event.approval.approve(now).then_some(()))
            .count()
    }

    fn pending(&self) -> Vec<PendingEntry> {
        self.events
            .iter()
            .filter(|event| event.approval.is_pending())
            .map(|event| PendingEntry {
                uuid: event.uuid,
                route_id: event.route_id,
                name: self.names.name_of(event.event_ref),
                measure: event.to_measure,
            })
            .collect()
    }

    fn continuity_issues(&self, route: &Route, tolerance: f64) -> Vec<ContinuityIssue> {
        let events = self.events_on(route.route_id());
        let issue = |event: &ContinuousEvent, measure: f64, kind: IssueKind| ContinuityIssue {
            uuid: event.uuid,
            name: self.names.name_of(event.event_ref),
            measure,
            kind,
        };
        let mut issues = Vec::new();
        let (Some(&first), Some(&last)) = (events.first(), events.last()) else {
            return issues;
        };
        if first.from_measure > tolerance {
            issues.push(issue(first, first.from_measure, IssueKind::StartNotAtZero));
        }
        for pair in events.windows(2) {
            let (prev, event) = (pair[0], pair[1]);
            let delta = event.from_measure - prev.to_measure;
            if delta > tolerance {
                issues.push(issue(event, event.from_measure, IssueKind::Gap));
            } else if delta < -tolerance {
                issues.push(issue(event, event.from_measure, IssueKind::Overlap));
            }
        }
        if (route.length() - last.to_measure).abs() > tolerance {
            issues.push(issue(last, last.to_measure, IssueKind::EndNotAtLength));
        }
        issues
    }
}

#[cfg(test)]
impl ContinuousEventClass {
    /// Overwrite the stored interval of an event
    pub(crate) fn set_interval(&mut self, uuid: Uuid, from_measure: f64, to_measure: f64) {
        if let Some(event) = self.events.iter_mut().find(|event| event.uuid == uuid) {
            event.from_measure = from_measure;
            event.to_measure = to_measure;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::straight_route;
    use super::*;
    use crate::{Part, RunLog, Severity};
    use geo::LineString;

    const TOL: f64 = 0.001;

    fn class_with_names(names: &[&str]) -> (ContinuousEventClass, Vec<Uuid>) {
        let mut class = ContinuousEventClass::new("surface");
        let uuids = names
            .iter()
            .map(|name| {
                let id = class.names_mut().add(name).unwrap();
                class.names().get(id).unwrap().uuid
            })
            .collect();
        (class, uuids)
    }

    /// Route of length 100 carrying A: 0-40 and B: 40-100
    fn tiled() -> (ContinuousEventClass, Route, Uuid, Uuid) {
        let (mut class, names) = class_with_names(&["A", "B"]);
        let route = straight_route(100.0);
        let b = class
            .insert(&route, names[1], Coord { x: 0.0, y: 0.0 }, TOL, Utc::now())
            .unwrap();
        let a = class
            .insert(&route, names[0], Coord { x: 40.0, y: 1.0 }, TOL, Utc::now())
            .unwrap();
        (class, route, a, b)
    }

    fn interval(class: &ContinuousEventClass, uuid: Uuid) -> (f64, f64) {
        let event = class.event(uuid).unwrap();
        (event.from_measure, event.to_measure)
    }

    #[test]
    fn test_insert_splits_interval() {
        let (class, route, a, b) = tiled();
        assert_eq!(interval(&class, a), (0.0, 40.0));
        assert_eq!(interval(&class, b), (40.0, 100.0));
        assert!(class.continuity_issues(&route, TOL).is_empty());
    }

    #[test]
    fn test_insert_rejections() {
        let (mut class, route, _, _) = tiled();
        let name = class.names().by_name("A").unwrap().uuid;
        let at_start = class.insert(&route, name, Coord { x: 0.0, y: 0.0 }, TOL, Utc::now());
        assert!(matches!(at_start, Err(LrsError::EditRejected(_))));
        let on_existing = class.insert(&route, name, Coord { x: 40.0, y: 0.0 }, TOL, Utc::now());
        assert!(on_existing.is_err());
        let unknown = class.insert(&route, Uuid::new_v4(), Coord { x: 10.0, y: 0.0 }, TOL, Utc::now());
        assert!(matches!(unknown, Err(LrsError::UnknownEventName(_))));
    }

    #[test]
    fn test_shrinking_route_forces_last_event_to_length() {
        let (mut class, route, a, b) = tiled();
        let mut shrunk = route.clone();
        shrunk
            .replace_parts(
                vec![Part::new(1, LineString::from(vec![(0.0, 0.0), (90.0, 0.0)]))],
                2,
            )
            .unwrap();
        let mut log = RunLog::new();
        let stats = class.synchronize_route(&shrunk, TOL, &mut log);
        assert_eq!(interval(&class, a), (0.0, 40.0));
        assert_eq!(interval(&class, b), (40.0, 90.0));
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.relocated, 1);
        assert!(class.event(b).unwrap().approval.is_pending());
        assert!(!class.event(a).unwrap().approval.is_pending());
        assert!(class.continuity_issues(&shrunk, TOL).is_empty());

        // Idempotent on the second pass
        let before = class.events().to_vec();
        let again = class.synchronize_route(&shrunk, TOL, &mut log);
        assert_eq!(again.changed(), 0);
        assert_eq!(class.events(), before.as_slice());
    }

    #[test]
    fn test_extension_at_start_shifts_measures() {
        let (mut class, route, a, b) = tiled();
        let mut extended = route.clone();
        extended
            .replace_parts(
                vec![Part::new(1, LineString::from(vec![(-10.0, 0.0), (100.0, 0.0)]))],
                2,
            )
            .unwrap();
        let mut log = RunLog::new();
        let stats = class.synchronize_route(&extended, TOL, &mut log);
        assert_eq!(stats.measure_only, 2);
        assert_eq!(interval(&class, a), (0.0, 50.0));
        assert_eq!(interval(&class, b), (50.0, 110.0));
        assert!(!class.event(a).unwrap().approval.is_pending());
    }

    #[test]
    fn test_event_on_boundary_is_deleted() {
        let (mut class, route, a, b) = tiled();
        let mut cut = route.clone();
        cut.replace_parts(
            vec![Part::new(1, LineString::from(vec![(40.0, 0.0), (100.0, 0.0)]))],
            2,
        )
        .unwrap();
        let mut log = RunLog::new();
        let stats = class.synchronize_route(&cut, TOL, &mut log);
        assert_eq!(stats.deleted, 1);
        assert!(class.event(a).is_none());
        assert_eq!(interval(&class, b), (0.0, 60.0));
        assert_eq!(log.warnings(), 1);
    }

    #[test]
    fn test_move_event_between_neighbours() {
        let (mut class, route, a, b) = tiled();
        class
            .move_event(a, &route, Coord { x: 55.0, y: 0.0 }, TOL)
            .unwrap();
        assert_eq!(interval(&class, a), (0.0, 55.0));
        assert_eq!(interval(&class, b), (55.0, 100.0));
        assert!(class.move_event(a, &route, Coord { x: 100.0, y: 0.0 }, TOL).is_err());
        assert!(class.move_event(b, &route, Coord { x: 70.0, y: 0.0 }, TOL).is_err());
        let other = straight_route(100.0);
        assert!(class.move_event(a, &other, Coord { x: 30.0, y: 0.0 }, TOL).is_err());
    }

    #[test]
    fn test_delete_hands_interval_to_successor() {
        let (mut class, route, a, b) = tiled();
        assert!(class.delete(b).is_err());
        class.delete(a).unwrap();
        assert_eq!(interval(&class, b), (0.0, 100.0));
        class.delete(b).unwrap();
        assert!(!class.references_route(route.route_id()));
    }

    #[test]
    fn test_continuity_issues() {
        let (mut class, route, a, b) = tiled();
        class.events.iter_mut().for_each(|event| {
            if event.uuid == b {
                event.from_measure = 45.0;
                event.to_measure = 95.0;
            }
        });
        let kinds: Vec<IssueKind> = class
            .continuity_issues(&route, TOL)
            .into_iter()
            .map(|issue| issue.kind)
            .collect();
        assert_eq!(kinds, vec![IssueKind::Gap, IssueKind::EndNotAtLength]);

        class.events.iter_mut().for_each(|event| {
            if event.uuid == a {
                event.from_measure = 2.0;
                event.to_measure = 50.0;
            }
        });
        let kinds: Vec<IssueKind> = class
            .continuity_issues(&route, TOL)
            .into_iter()
            .map(|issue| issue.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![IssueKind::StartNotAtZero, IssueKind::Overlap, IssueKind::EndNotAtLength]
        );
    }

    #[test]
    fn test_rename_informs_about_equal_neighbour() {
        let (mut class, _, a, b) = tiled();
        let name_b = class.event(b).unwrap().event_ref;
        let mut log = RunLog::new();
        class.rename(a, name_b, &mut log).unwrap();
        assert!(log.contains(Severity::Inform, "same name"));
        assert_eq!(class.unused_names(), vec!["A".to_string()]);
    }
}
