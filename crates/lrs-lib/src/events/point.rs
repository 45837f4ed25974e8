//! Point events: one anchor geometry per event name, projected onto any number of routes
//!
//! Each projection is a [`BasePoint`]. Basepoints are synchronized independently of each
//! other; the anchor itself never moves during synchronization.

use super::{EventClassKind, EventNameRegistry, SyncAction, SyncStats, Synchronize};
use crate::approval::{ApprovalState, ContinuityIssue, PendingEntry};
use crate::log::LogSink;
use crate::{LrsError, Result, Route, RouteCollection, RouteId};
use chrono::{DateTime, Utc};
use geo::Coord;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Projection of a point event onto one route
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasePoint {
    pub uuid: Uuid,
    /// Uuid of the event name
    pub event_ref: Uuid,
    pub route_id: RouteId,
    /// Anchor snapped onto the route
    pub point: Coord<f64>,
    pub measure: f64,
    pub azimuth: f64,
    pub approval: ApprovalState,
}

/// A class of point events
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PointEventClass {
    name: String,
    names: EventNameRegistry,
    /// Anchor geometry per event name uuid
    anchors: BTreeMap<Uuid, Coord<f64>>,
    basepoints: Vec<BasePoint>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl PointEventClass {
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
    pub fn basepoints(&self) -> &[BasePoint] {
        &self.basepoints
    }

    pub fn basepoint(&self, uuid: Uuid) -> Option<&BasePoint> {
        self.basepoints.iter().find(|bp| bp.uuid == uuid)
    }

    /// Anchor geometry of an event, if it is placed
    pub fn anchor(&self, event_ref: Uuid) -> Option<Coord<f64>> {
        self.anchors.get(&event_ref).copied()
    }

    fn require_name(&self, event_ref: Uuid) -> Result<()> {
        self.names
            .by_uuid(event_ref)
            .map(|_| ())
            .ok_or_else(|| LrsError::UnknownEventName(event_ref.to_string()))
    }

    fn new_basepoint(
        event_ref: Uuid,
        route: &Route,
        point: Coord<f64>,
        now: DateTime<Utc>,
    ) -> Result<BasePoint> {
        let projection = route.project(point, None)?;
        Ok(BasePoint {
            uuid: Uuid::new_v4(),
            event_ref,
            route_id: route.route_id(),
            point: projection.point,
            measure: projection.measure,
            azimuth: projection.azimuth,
            approval: ApprovalState::Approved(now),
        })
    }

    /// Place an event that has no geometry yet
    ///
    /// # Arguments
    /// * `event_ref` - Uuid of an unused event name
    /// * `point` - Anchor geometry
    /// * `routes` - Routes to project the anchor onto, one basepoint each
    ///
    /// # Returns
    /// The uuids of the new basepoints. Nothing is stored if any projection fails.
    pub fn place(
        &mut self,
        event_ref: Uuid,
        point: Coord<f64>,
        routes: &[&Route],
        now: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        self.require_name(event_ref)?;
        if self.anchors.contains_key(&event_ref) {
            return Err(LrsError::EditRejected("Event Name is already used.".into()));
        }
        let mut seen = BTreeSet::new();
        let mut created = Vec::with_capacity(routes.len());
        for route in routes {
            if !seen.insert(route.route_id()) {
                continue;
            }
            created.push(Self::new_basepoint(event_ref, route, point, now)?);
        }
        let uuids = created.iter().map(|bp| bp.uuid).collect();
        self.anchors.insert(event_ref, point);
        self.basepoints.extend(created);
        Ok(uuids)
    }

    /// Project a placed event onto one more route
    pub fn add_basepoint(&mut self, event_ref: Uuid, route: &Route, now: DateTime<Utc>) -> Result<Uuid> {
        let anchor = self
            .anchor(event_ref)
            .ok_or(LrsError::UnknownEvent(event_ref))?;
        let duplicate = self
            .basepoints
            .iter()
            .any(|bp| bp.event_ref == event_ref && bp.route_id == route.route_id());
        if duplicate {
            return Err(LrsError::EditRejected(
                "A Base Point already exists on this route.".into(),
            ));
        }
        let basepoint = Self::new_basepoint(event_ref, route, anchor, now)?;
        let uuid = basepoint.uuid;
        self.basepoints.push(basepoint);
        Ok(uuid)
    }

    /// Move the anchor of an event and re-project all of its basepoints
    ///
    /// Approval states are left as they are.
    pub fn move_event(&mut self, event_ref: Uuid, point: Coord<f64>, routes: &RouteCollection) -> Result<()> {
        if !self.anchors.contains_key(&event_ref) {
            return Err(LrsError::UnknownEvent(event_ref));
        }
        let mut updates = Vec::new();
        for (index, bp) in self.basepoints.iter().enumerate() {
            if bp.event_ref != event_ref {
                continue;
            }
            let route = routes
                .get(bp.route_id)
                .ok_or_else(|| LrsError::UnknownRoute(bp.route_id.to_string()))?;
            updates.push((index, route.project(point, None)?));
        }
        for (index, projection) in updates {
            let bp = &mut self.basepoints[index];
            bp.point = projection.point;
            bp.measure = projection.measure;
            bp.azimuth = projection.azimuth;
        }
        self.anchors.insert(event_ref, point);
        Ok(())
    }

    /// Remove one basepoint; the event loses its anchor with its last basepoint
    pub fn remove_basepoint(&mut self, uuid: Uuid) -> Result<BasePoint> {
        let index = self
            .basepoints
            .iter()
            .position(|bp| bp.uuid == uuid)
            .ok_or(LrsError::UnknownEvent(uuid))?;
        let removed = self.basepoints.remove(index);
        if !self.basepoints.iter().any(|bp| bp.event_ref == removed.event_ref) {
            self.anchors.remove(&removed.event_ref);
        }
        Ok(removed)
    }

    /// Clear the anchor and all basepoints of an event; returns the removed basepoint count
    pub fn reset(&mut self, event_ref: Uuid) -> usize {
        let before = self.basepoints.len();
        self.basepoints.retain(|bp| bp.event_ref != event_ref);
        self.anchors.remove(&event_ref);
        before - self.basepoints.len()
    }

    /// Names not yet placed
    pub fn unused_names(&self) -> Vec<String> {
        self.names.unused_names(self.anchors.keys().copied())
    }

    /// Basepoints whose event name is unknown
    pub fn orphan_basepoints(&self) -> Vec<Uuid> {
        self.basepoints
            .iter()
            .filter(|bp| self.names.by_uuid(bp.event_ref).is_none())
            .map(|bp| bp.uuid)
            .collect()
    }
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Synchronize for PointEventClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> EventClassKind {
        EventClassKind::Point
    }

    fn references_route(&self, route_id: RouteId) -> bool {
        self.basepoints.iter().any(|bp| bp.route_id == route_id)
    }

    fn synchronize_route(&mut self, route: &Route, tolerance: f64, log: &mut dyn LogSink) -> SyncStats {
        let mut stats = SyncStats::default();
        for bp in self
            .basepoints
            .iter_mut()
            .filter(|bp| bp.route_id == route.route_id())
        {
            let Some(anchor) = self.anchors.get(&bp.event_ref).copied() else {
                log.error(&format!(
                    "Route {}: Base Point {} has no event geometry",
                    route.name(),
                    bp.uuid
                ));
                stats.failed += 1;
                continue;
            };
            let projection = match route.project(anchor, None) {
                Ok(projection) => projection,
                Err(err) => {
                    log.error(&format!("Route {}: {err}", route.name()));
                    stats.failed += 1;
                    continue;
                }
            };
            let action = SyncAction::decide(bp.point, bp.measure, &projection, tolerance);
            match action {
                SyncAction::Unchanged => {}
                SyncAction::MeasureOnly => {
                    bp.measure = projection.measure;
                    bp.azimuth = projection.azimuth;
                }
                SyncAction::Relocated => {
                    bp.point = projection.point;
                    bp.measure = projection.measure;
                    bp.azimuth = projection.azimuth;
                    bp.approval.reset();
                }
            }
            tracing::trace!(uuid = %bp.uuid, ?action, "basepoint synchronized");
            stats.record(action);
        }
        stats
    }

    fn delete_route_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> usize {
        let affected: BTreeSet<Uuid> = self
            .basepoints
            .iter()
            .filter(|bp| bp.route_id == route_id)
            .map(|bp| bp.event_ref)
            .collect();
        let before = self.basepoints.len();
        self.basepoints.retain(|bp| bp.route_id != route_id);
        let removed = before - self.basepoints.len();
        for event_ref in affected {
            if !self.basepoints.iter().any(|bp| bp.event_ref == event_ref) {
                self.anchors.remove(&event_ref);
            }
        }
        if removed > 0 {
            log.inform(&format!("{}: {removed} Base Points deleted", self.name));
        }
        removed
    }

    fn approve(&mut self, uuid: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.basepoints
            .iter_mut()
            .find(|bp| bp.uuid == uuid)
            .map(|bp| bp.approval.approve(now))
            .ok_or(LrsError::UnknownEvent(uuid))
    }

    fn approve_all(&mut self, now: DateTime<Utc>) -> usize {
        self.basepoints
            .iter_mut()
            .filter_map(|bp| bp.approval.approve(now).then_some(()))
            .count()
    }

    fn pending(&self) -> Vec<PendingEntry> {
        self.basepoints
            .iter()
            .filter(|bp| bp.approval.is_pending())
            .map(|bp| PendingEntry {
                uuid: bp.uuid,
                route_id: bp.route_id,
                name: self.names.name_of(bp.event_ref),
                measure: bp.measure,
            })
            .collect()
    }

    fn continuity_issues(&self, _route: &Route, _tolerance: f64) -> Vec<ContinuityIssue> {
        Vec::new()
    }
}
