//! Stored routes and their synchronization against a validated basesystem

use crate::log::LogSink;
use crate::topology::{TopologyReport, ValidatedRoute};
use crate::{LrsError, Part, Projection, Result, Route, RouteId, utils};
use geo::Coord;
use std::collections::BTreeMap;

/// A vanished route that still carries events
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BlockedDeletion {
    pub route_id: RouteId,
    pub route_name: String,
    /// Event class still referencing the route
    pub event_class: String,
}

/// What a route synchronization changed
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteSyncOutcome {
    pub inserted: Vec<RouteId>,
    /// Routes with new geometry; their events need synchronization
    pub updated: Vec<RouteId>,
    pub deleted: Vec<String>,
    pub blocked: Vec<BlockedDeletion>,
    /// Routes with the same segments in a different vertex order, left untouched
    pub unordered: Vec<String>,
    /// Routes kept with their old geometry and marked invalid
    pub invalidated: Vec<String>,
}

/// All routes of a project, keyed by id
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RouteCollection {
    routes: BTreeMap<RouteId, Route>,
}

/// Undirected segments of all parts, sorted; equal for routes covering the same geometry
fn segment_keys(parts: &[Part]) -> Vec<((u64, u64), (u64, u64))> {
    let mut keys: Vec<_> = parts
        .iter()
        .flat_map(|part| part.geometry.lines())
        .map(|line| {
            let (a, b) = (utils::coord_key(line.start), utils::coord_key(line.end));
            if a <= b { (a, b) } else { (b, a) }
        })
        .collect();
    keys.sort_unstable();
    keys
}

/// Same parts with the same vertices in the same order
fn ordering_equal(old: &[Part], new: &[Part]) -> bool {
    old.len() == new.len()
        && old.iter().zip(new).all(|(a, b)| {
            a.sortnr == b.sortnr
                && a.geometry.0.len() == b.geometry.0.len()
                && a.geometry
                    .0
                    .iter()
                    .zip(&b.geometry.0)
                    .all(|(p, q)| utils::coord_key(*p) == utils::coord_key(*q))
        })
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RouteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn get(&self, route_id: RouteId) -> Option<&Route> {
        self.routes.get(&route_id)
    }

    #[inline]
    pub fn get_mut(&mut self, route_id: RouteId) -> Option<&mut Route> {
        self.routes.get_mut(&route_id)
    }

    /// Route by its (trimmed) name
    pub fn by_name(&self, name: &str) -> Option<&Route> {
        let name = name.trim();
        self.routes.values().find(|route| route.name() == name)
    }

    fn require(&self, route_id: RouteId) -> Result<&Route> {
        self.get(route_id)
            .ok_or_else(|| LrsError::UnknownRoute(route_id.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Add a route; names are unique within a collection
    pub fn insert(&mut self, route: Route) -> Result<RouteId> {
        if self.by_name(route.name()).is_some() {
            return Err(LrsError::InconsistentData(format!(
                "route name {} used twice",
                route.name()
            )));
        }
        let route_id = route.route_id();
        self.routes.insert(route_id, route);
        Ok(route_id)
    }

    pub fn remove(&mut self, route_id: RouteId) -> Option<Route> {
        self.routes.remove(&route_id)
    }

    /// Project a position onto a stored route
    pub fn project(&self, route_id: RouteId, point: Coord<f64>, part_hint: Option<u32>) -> Result<Projection> {
        self.require(route_id)?.project(point, part_hint)
    }

    pub fn route_end(&self, route_id: RouteId) -> Result<Projection> {
        self.require(route_id)?.route_end()
    }

    pub fn recompute_lengths(&mut self, route_id: RouteId) -> Result<f64> {
        let route = self
            .get_mut(route_id)
            .ok_or_else(|| LrsError::UnknownRoute(route_id.to_string()))?;
        route.recompute_lengths();
        Ok(route.length())
    }

    /// Bring the stored routes in line with a validated basesystem
    ///
    /// # Arguments
    /// * `report` - Topology of the current basesystem
    /// * `referencing_classes` - Names of the event classes with events on a route
    /// * `log` - Receives one entry per change and per refused change
    ///
    /// # Returns
    /// The changed routes; `updated` lists the routes whose events need synchronization
    pub fn synchronize(
        &mut self,
        report: &TopologyReport,
        referencing_classes: &dyn Fn(RouteId) -> Vec<String>,
        log: &mut dyn LogSink,
    ) -> RouteSyncOutcome {
        #[cfg(feature = "profiling")]
        profiling::scope!("RouteCollection::synchronize");

        let mut outcome = RouteSyncOutcome::default();

        for validated in report.valid_routes() {
            if self.by_name(&validated.name).is_some() {
                continue;
            }
            match Route::new(RouteId::new(), &validated.name, report.basesystem_id, validated.parts()) {
                Ok(route) => {
                    let route_id = route.route_id();
                    self.routes.insert(route_id, route);
                    log.inform(&format!("Route {}: new route inserted", validated.name));
                    outcome.inserted.push(route_id);
                }
                Err(err) => log.error(&format!("Route {}: {err}", validated.name)),
            }
        }

        let stored: Vec<(RouteId, String)> = self
            .routes
            .values()
            .filter(|route| !outcome.inserted.contains(&route.route_id()))
            .map(|route| (route.route_id(), route.name().to_string()))
            .collect();

        for (route_id, name) in stored {
            match report.routes.get(&name) {
                None => self.vanish(route_id, &name, referencing_classes, log, &mut outcome),
                Some(validated) if validated.valid => {
                    self.refresh(route_id, validated, report.basesystem_id, log, &mut outcome)
                }
                Some(_) => {
                    if let Some(route) = self.routes.get_mut(&route_id) {
                        route.set_valid(false);
                    }
                    log.warning(&format!(
                        "Route {name}: topology not valid, route kept unchanged"
                    ));
                    outcome.invalidated.push(name);
                }
            }
        }

        for route in self.routes.values_mut() {
            route.recompute_lengths();
        }
        tracing::info!(
            inserted = outcome.inserted.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            blocked = outcome.blocked.len(),
            "routes synchronized"
        );
        outcome
    }

    fn vanish(
        &mut self,
        route_id: RouteId,
        name: &str,
        referencing_classes: &dyn Fn(RouteId) -> Vec<String>,
        log: &mut dyn LogSink,
        outcome: &mut RouteSyncOutcome,
    ) {
        let classes = referencing_classes(route_id);
        if classes.is_empty() {
            self.routes.remove(&route_id);
            log.inform(&format!("Route {name}: deleted"));
            outcome.deleted.push(name.to_string());
            return;
        }
        for event_class in classes {
            log.error(&format!(
                "Route {name}: Basesystem does not exist anymore, but still has events of class {event_class}"
            ));
            outcome.blocked.push(BlockedDeletion {
                route_id,
                route_name: name.to_string(),
                event_class,
            });
        }
    }

    fn refresh(
        &mut self,
        route_id: RouteId,
        validated: &ValidatedRoute,
        basesystem_id: u32,
        log: &mut dyn LogSink,
        outcome: &mut RouteSyncOutcome,
    ) {
        let Some(route) = self.routes.get_mut(&route_id) else {
            return;
        };
        route.set_valid(true);
        let parts = validated.parts();
        if ordering_equal(route.parts(), &parts) {
            return;
        }
        if segment_keys(route.parts()) == segment_keys(&parts) {
            log.error(&format!(
                "Route {}: coordinates are not in the same order. Route not updated",
                validated.name
            ));
            outcome.unordered.push(validated.name.clone());
            return;
        }
        match route.replace_parts(parts, basesystem_id) {
            Ok(()) => {
                log.inform(&format!("Route {}: geometry updated", validated.name));
                outcome.updated.push(route_id);
            }
            Err(err) => log.error(&format!("Route {}: {err}", validated.name)),
        }
    }
}
