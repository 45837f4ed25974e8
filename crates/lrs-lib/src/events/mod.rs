//! Event classes and their synchronization against changed routes
//!
//! All three classes share one decision policy ([`SyncAction::decide`]) and one interface
//! ([`Synchronize`]). [`EventClass`] is the closed set of classes a project can hold.

mod continuous;
mod names;
mod point;
mod tour;

pub use continuous::{ContinuousEvent, ContinuousEventClass};
pub use names::{EventName, EventNameId, EventNameRegistry};
pub use point::{BasePoint, PointEventClass};
pub use tour::{EndpointKind, MoveBounds, TourEndpoint, TourEventClass, TourPart};

use crate::approval::{ContinuityIssue, PendingEntry};
use crate::log::LogSink;
use crate::{Projection, Result, Route, RouteId, utils};
use chrono::{DateTime, Utc};
use geo::Coord;
use std::fmt;
use std::ops::AddAssign;
use uuid::Uuid;

/// What synchronization does to one event position
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncAction {
    /// The route changed elsewhere
    Unchanged,
    /// The route changed beneath the position: new measure and azimuth, approval kept
    MeasureOnly,
    /// The route moved away from the position: new geometry, measure and azimuth, pending
    Relocated,
}

impl SyncAction {
    /// Compare a stored position with its fresh projection
    ///
    /// # Arguments
    /// * `old_point` - Stored event geometry
    /// * `old_measure` - Stored measure of that geometry
    /// * `new` - Projection of the event's anchor onto the current route
    /// * `tolerance` - Project tolerance
    pub fn decide(old_point: Coord<f64>, old_measure: f64, new: &Projection, tolerance: f64) -> Self {
        if utils::distance(old_point, new.point) > tolerance {
            SyncAction::Relocated
        } else if (old_measure - new.measure).abs() > tolerance {
            SyncAction::MeasureOnly
        } else {
            SyncAction::Unchanged
        }
    }
}

/// Counters of one synchronization pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SyncStats {
    pub unchanged: usize,
    pub measure_only: usize,
    pub relocated: usize,
    pub deleted: usize,
    /// Rows skipped because of inconsistent data
    pub failed: usize,
}

impl SyncStats {
    pub fn record(&mut self, action: SyncAction) {
        match action {
            SyncAction::Unchanged => self.unchanged += 1,
            SyncAction::MeasureOnly => self.measure_only += 1,
            SyncAction::Relocated => self.relocated += 1,
        }
    }

    /// Rows that were modified or deleted
    #[inline]
    pub fn changed(&self) -> usize {
        self.measure_only + self.relocated + self.deleted
    }
}

impl AddAssign for SyncStats {
    fn add_assign(&mut self, other: Self) {
        self.unchanged += other.unchanged;
        self.measure_only += other.measure_only;
        self.relocated += other.relocated;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

/// Kind tag of an event class
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EventClassKind {
    Point,
    Continuous,
    Tour,
}

impl fmt::Display for EventClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventClassKind::Point => "point",
            EventClassKind::Continuous => "continuous",
            EventClassKind::Tour => "tour",
        })
    }
}

/// Interface shared by all event classes
pub trait Synchronize {
    /// Name of the class within its project
    fn name(&self) -> &str;

    fn kind(&self) -> EventClassKind;

    /// Whether any row of the class is located on the route
    fn references_route(&self, route_id: RouteId) -> bool;

    /// Bring every row on `route` in line with its current geometry
    fn synchronize_route(&mut self, route: &Route, tolerance: f64, log: &mut dyn LogSink)
    -> SyncStats;

    /// Remove every row located on the route; returns the number of removed rows
    fn delete_route_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> usize;

    /// Approve one pending row; returns whether its state changed
    fn approve(&mut self, uuid: Uuid, now: DateTime<Utc>) -> Result<bool>;

    /// Approve every pending row; returns the number of approved rows
    fn approve_all(&mut self, now: DateTime<Utc>) -> usize;

    /// Rows awaiting approval
    fn pending(&self) -> Vec<PendingEntry>;

    /// Measure continuity problems of all rows on `route`
    fn continuity_issues(&self, route: &Route, tolerance: f64) -> Vec<ContinuityIssue>;
}

/// The closed set of event classes
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "lowercase"))]
pub enum EventClass {
    Point(PointEventClass),
    Continuous(ContinuousEventClass),
    Tour(TourEventClass),
}

impl EventClass {
    fn inner(&self) -> &dyn Synchronize {
        match self {
            EventClass::Point(class) => class,
            EventClass::Continuous(class) => class,
            EventClass::Tour(class) => class,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Synchronize {
        match self {
            EventClass::Point(class) => class,
            EventClass::Continuous(class) => class,
            EventClass::Tour(class) => class,
        }
    }

    pub fn as_point_mut(&mut self) -> Option<&mut PointEventClass> {
        match self {
            EventClass::Point(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_continuous_mut(&mut self) -> Option<&mut ContinuousEventClass> {
        match self {
            EventClass::Continuous(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_tour_mut(&mut self) -> Option<&mut TourEventClass> {
        match self {
            EventClass::Tour(class) => Some(class),
            _ => None,
        }
    }

    /// Event name dictionary of the class
    pub fn names(&self) -> &EventNameRegistry {
        match self {
            EventClass::Point(class) => class.names(),
            EventClass::Continuous(class) => class.names(),
            EventClass::Tour(class) => class.names(),
        }
    }

    /// Names no row refers to
    pub fn unused_names(&self) -> Vec<String> {
        match self {
            EventClass::Point(class) => class.unused_names(),
            EventClass::Continuous(class) => class.unused_names(),
            EventClass::Tour(class) => class.unused_names(),
        }
    }
}

impl Synchronize for EventClass {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn kind(&self) -> EventClassKind {
        self.inner().kind()
    }

    fn references_route(&self, route_id: RouteId) -> bool {
        self.inner().references_route(route_id)
    }

    fn synchronize_route(&mut self, route: &Route, tolerance: f64, log: &mut dyn LogSink) -> SyncStats {
        self.inner_mut().synchronize_route(route, tolerance, log)
    }

    fn delete_route_events(&mut self, route_id: RouteId, log: &mut dyn LogSink) -> usize {
        self.inner_mut().delete_route_events(route_id, log)
    }

    fn approve(&mut self, uuid: Uuid, now: DateTime<Utc>) -> Result<bool> {
        self.inner_mut().approve(uuid, now)
    }

    fn approve_all(&mut self, now: DateTime<Utc>) -> usize {
        self.inner_mut().approve_all(now)
    }

    fn pending(&self) -> Vec<PendingEntry> {
        self.inner().pending()
    }

    fn continuity_issues(&self, route: &Route, tolerance: f64) -> Vec<ContinuityIssue> {
        self.inner().continuity_issues(route, tolerance)
    }
}

impl From<PointEventClass> for EventClass {
    fn from(class: PointEventClass) -> Self {
        EventClass::Point(class)
    }
}

impl From<ContinuousEventClass> for EventClass {
    fn from(class: ContinuousEventClass) -> Self {
        EventClass::Continuous(class)
    }
}

impl From<TourEventClass> for EventClass {
    fn from(class: TourEventClass) -> Self {
        EventClass::Tour(class)
    }
}
