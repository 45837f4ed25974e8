//! Project configuration and orchestration of route update runs

use crate::approval::ApprovalGate;
use crate::events::{EventClass, SyncStats, Synchronize};
use crate::log::LogSink;
use crate::{BlockedDeletion, LrsError, RawNetwork, Result, RouteCollection, RouteId, TopologyValidator};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Settings of one linear referencing project
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ProjectConfig {
    pub name: String,
    /// Distance below which two positions or measures are considered equal
    pub tolerance: f64,
    /// Spatial reference id of all geometries
    pub srid: u32,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "lrs".to_string(),
            tolerance: 0.001,
            srid: 2056,
        }
    }
}

/// Summary of a route update run
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteUpdateOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
    pub invalid: usize,
    pub orphans: Vec<String>,
    /// Vanished routes kept because events still reference them
    pub blocked: Vec<BlockedDeletion>,
    pub events: SyncStats,
}

/// Routes plus the event classes located along them
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Project {
    pub config: ProjectConfig,
    pub routes: RouteCollection,
    pub classes: Vec<EventClass>,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl Project {
    pub fn new(config: ProjectConfig) -> Self {
        Self {
            config,
            routes: RouteCollection::new(),
            classes: Vec::new(),
        }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.config.tolerance
    }

    /// Add an event class; class names are unique within a project
    pub fn add_class(&mut self, class: impl Into<EventClass>) -> Result<()> {
        let class = class.into();
        if self.class(class.name()).is_ok() {
            return Err(LrsError::InconsistentData(format!(
                "event class {} exists already",
                class.name()
            )));
        }
        self.classes.push(class);
        Ok(())
    }

    pub fn class(&self, name: &str) -> Result<&EventClass> {
        self.classes
            .iter()
            .find(|class| class.name() == name)
            .ok_or_else(|| LrsError::UnknownEventClass(name.to_string()))
    }

    pub fn class_mut(&mut self, name: &str) -> Result<&mut EventClass> {
        self.classes
            .iter_mut()
            .find(|class| class.name() == name)
            .ok_or_else(|| LrsError::UnknownEventClass(name.to_string()))
    }

    /// Names of the classes with events on a route
    pub fn referencing_classes(&self, route_id: RouteId) -> Vec<String> {
        self.classes
            .iter()
            .filter(|class| class.references_route(route_id))
            .map(|class| class.name().to_string())
            .collect()
    }

    /// Run a complete route update against a new basesystem
    ///
    /// Data check, topology, route synchronization, then event synchronization for every
    /// route whose geometry changed. A failed data check aborts before anything is changed.
    pub fn update_routes(&mut self, network: &RawNetwork, log: &mut dyn LogSink) -> Result<RouteUpdateOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Project::update_routes");

        let tolerance = self.config.tolerance;
        let report = TopologyValidator::new(tolerance).validate(network, log)?;

        let classes = &self.classes;
        let referencing = |route_id: RouteId| -> Vec<String> {
            classes
                .iter()
                .filter(|class| class.references_route(route_id))
                .map(|class| class.name().to_string())
                .collect()
        };
        let synced = self.routes.synchronize(&report, &referencing, log);

        let mut events = SyncStats::default();
        for &route_id in &synced.updated {
            events += self.synchronize_events(route_id, log)?;
        }

        let outcome = RouteUpdateOutcome {
            inserted: synced.inserted.len(),
            updated: synced.updated.len(),
            deleted: synced.deleted.len(),
            invalid: report.invalid_count(),
            orphans: report.orphans,
            blocked: synced.blocked,
            events,
        };
        tracing::info!(
            project = %self.config.name,
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            invalid = outcome.invalid,
            "route update finished"
        );
        Ok(outcome)
    }

    /// Synchronize every event class on one route
    pub fn synchronize_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> Result<SyncStats> {
        let route = self
            .routes
            .get(route_id)
            .ok_or_else(|| LrsError::UnknownRoute(route_id.to_string()))?;
        let mut total = SyncStats::default();
        for class in &mut self.classes {
            let stats = class.synchronize_route(route, self.config.tolerance, log);
            if stats.changed() > 0 || stats.failed > 0 {
                log.inform(&format!(
                    "Route {}: {} {} events updated, {} set to pending, {} deleted",
                    route.name(),
                    class.name(),
                    stats.measure_only + stats.relocated,
                    stats.relocated,
                    stats.deleted
                ));
            }
            total += stats;
        }
        Ok(total)
    }

    /// Delete vanished routes together with the events still referencing them
    ///
    /// # Returns
    /// The number of deleted events
    pub fn delete_routes_with_events(&mut self, blocked: &[BlockedDeletion], log: &mut dyn LogSink) -> usize {
        let mut removed = 0;
        for deletion in blocked {
            if self.routes.get(deletion.route_id).is_none() {
                continue;
            }
            for class in &mut self.classes {
                removed += class.delete_route_events(deletion.route_id, log);
            }
            self.routes.remove(deletion.route_id);
            log.inform(&format!("Route {}: deleted with its events", deletion.route_name));
        }
        removed
    }

    /// Approval queries over the current routes
    pub fn approval_gate(&self) -> ApprovalGate<'_> {
        ApprovalGate::new(&self.routes, self.config.tolerance)
    }

    pub fn approve(&mut self, class: &str, uuid: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.class_mut(class)?.approve(uuid, now)
    }

    pub fn approve_all(&mut self, class: &str, now: DateTime<Utc>) -> Result<usize> {
        Ok(self.class_mut(class)?.approve_all(now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basesystem::{LineFeature, NodeFeature};
    use crate::{ContinuousEventClass, PointEventClass, RunLog, Severity};
    use geo::{Coord, LineString};

    fn line(id: i64, name: &str, coords: &[(f64, f64)]) -> LineFeature {
        LineFeature {
            id,
            route_name: Some(name.to_string()),
            geometry: LineString::from(coords.to_vec()),
            pathnr: None,
        }
    }

    fn node(id: i64, name: &str, sortnr: u32, node_type: i32, x: f64, y: f64) -> NodeFeature {
        NodeFeature {
            id,
            route_name: Some(name.to_string()),
            sortnr: Some(sortnr),
            node_type: Some(node_type),
            point: Coord { x, y },
        }
    }

    /// Single straight route `R` from the origin to `(end, 0)`
    fn network(end: f64) -> RawNetwork {
        RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(0.0, 0.0), (end, 0.0)])],
            nodes: vec![node(1, "R", 1, 1, 0.0, 0.0), node(2, "R", 1, 2, end, 0.0)],
        }
    }

    fn project_with_events() -> (Project, Uuid, Uuid) {
        let mut project = Project::new(ProjectConfig::default());
        let mut log = RunLog::new();
        project.update_routes(&network(100.0), &mut log).unwrap();
        let route = project.routes.by_name("R").unwrap().clone();

        let mut surface = ContinuousEventClass::new("surface");
        let a = surface.names_mut().add("asphalt").unwrap();
        let b = surface.names_mut().add("gravel").unwrap();
        let a = surface.names().get(a).unwrap().uuid;
        let b = surface.names().get(b).unwrap().uuid;
        let tol = project.tolerance();
        let last = surface
            .insert(&route, b, Coord { x: 0.0, y: 0.0 }, tol, Utc::now())
            .unwrap();
        let first = surface
            .insert(&route, a, Coord { x: 40.0, y: 0.0 }, tol, Utc::now())
            .unwrap();
        project.add_class(surface).unwrap();
        (project, first, last)
    }

    #[test]
    fn test_update_run_synchronizes_events() {
        let (mut project, first, last) = project_with_events();
        let mut log = RunLog::new();
        let outcome = project.update_routes(&network(90.0), &mut log).unwrap();
        assert_eq!(outcome.updated, 1);
        assert_eq!(outcome.events.relocated, 1);

        let class = project.class("surface").unwrap();
        let EventClass::Continuous(surface) = class else {
            panic!("wrong class kind");
        };
        let first = surface.event(first).unwrap();
        let last = surface.event(last).unwrap();
        assert_eq!((first.from_measure, first.to_measure), (0.0, 40.0));
        assert_eq!((last.from_measure, last.to_measure), (40.0, 90.0));

        let pending = project.approval_gate().list_pending(class);
        assert_eq!(pending["R"].len(), 1);
        assert!(project.approval_gate().list_continuity_errors(class).is_empty());
        assert_eq!(project.approve_all("surface", Utc::now()).unwrap(), 1);

        // Unchanged basesystem: nothing to do
        let outcome = project.update_routes(&network(90.0), &mut log).unwrap();
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.events, SyncStats::default());
    }

    #[test]
    fn test_fatal_data_check_changes_nothing() {
        let (mut project, _, _) = project_with_events();
        let mut broken = network(50.0);
        broken.nodes[0].node_type = None;
        let mut log = RunLog::new();
        assert!(matches!(
            project.update_routes(&broken, &mut log),
            Err(LrsError::FatalValidation(_))
        ));
        assert!((project.routes.by_name("R").unwrap().length() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_vanished_route_with_events_is_blocked_then_cascaded() {
        let (mut project, _, _) = project_with_events();
        let mut log = RunLog::new();
        let outcome = project.update_routes(&RawNetwork::default(), &mut log).unwrap();
        assert_eq!(outcome.blocked.len(), 1);
        assert!(log.contains(Severity::Error, "still has events of class surface"));
        assert_eq!(project.routes.len(), 1);

        assert_eq!(project.delete_routes_with_events(&outcome.blocked, &mut log), 2);
        assert!(project.routes.is_empty());
    }

    #[test]
    fn test_class_names_are_unique() {
        let mut project = Project::new(ProjectConfig::default());
        project.add_class(PointEventClass::new("signals")).unwrap();
        assert!(project.add_class(PointEventClass::new("signals")).is_err());
        assert!(matches!(
            project.approve("missing", Uuid::new_v4(), Utc::now()),
            Err(LrsError::UnknownEventClass(_))
        ));
    }
}
