//! Approval workflow for events touched by route synchronization
//!
//! Synchronization that relocates an event forces it back to [`ApprovalState::Pending`];
//! only an explicit approval moves it to [`ApprovalState::Approved`].

use crate::events::{EventClass, Synchronize};
use crate::{RouteCollection, RouteId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

/// Approval state of a single event row
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "state", content = "at"))]
pub enum ApprovalState {
    Pending,
    Approved(DateTime<Utc>),
}

impl ApprovalState {
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, ApprovalState::Pending)
    }

    /// Timestamp of the approval, if approved
    #[inline]
    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ApprovalState::Approved(at) => Some(*at),
            ApprovalState::Pending => None,
        }
    }

    /// `Pending → Approved(now)`; returns whether the state changed
    pub fn approve(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_pending() {
            *self = ApprovalState::Approved(now);
            true
        } else {
            false
        }
    }

    /// Force back to pending after a relocation
    #[inline]
    pub fn reset(&mut self) {
        *self = ApprovalState::Pending;
    }
}

/// A pending event as listed for approval
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingEntry {
    /// Row awaiting approval
    pub uuid: Uuid,
    pub route_id: RouteId,
    /// Event (or tour) name, empty if the name is unknown
    pub name: String,
    pub measure: f64,
}

/// Kind of a measure continuity problem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum IssueKind {
    /// First event does not start at measure 0
    StartNotAtZero,
    /// Event starts after the previous one ended
    Gap,
    /// Event starts before the previous one ended
    Overlap,
    /// Last event does not end at the route length
    EndNotAtLength,
    /// Tour part with zero length or from > to
    DegeneratePart,
    /// Tour part overlapping another part of the same tour
    OverlappingPart,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueKind::StartNotAtZero => "first event not at route start",
            IssueKind::Gap => "gap to previous event",
            IssueKind::Overlap => "overlap with previous event",
            IssueKind::EndNotAtLength => "last event not at route end",
            IssueKind::DegeneratePart => "invalid part measures",
            IssueKind::OverlappingPart => "overlapping tour parts",
        })
    }
}

/// A continuity problem found on a route
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContinuityIssue {
    pub uuid: Uuid,
    pub name: String,
    pub measure: f64,
    pub kind: IssueKind,
}

/// Read-only view answering approval queries for one event class
pub struct ApprovalGate<'a> {
    routes: &'a RouteCollection,
    tolerance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'a> ApprovalGate<'a> {
    pub fn new(routes: &'a RouteCollection, tolerance: f64) -> Self {
        Self { routes, tolerance }
    }

    fn route_name(&self, route_id: RouteId) -> String {
        self.routes
            .get(route_id)
            .map(|route| route.name().to_string())
            .unwrap_or_else(|| route_id.to_string())
    }

    /// Pending events grouped by route name, each group sorted by measure
    pub fn list_pending(&self, class: &EventClass) -> BTreeMap<String, Vec<PendingEntry>> {
        let mut grouped: BTreeMap<String, Vec<PendingEntry>> = BTreeMap::new();
        for entry in class.pending() {
            grouped
                .entry(self.route_name(entry.route_id))
                .or_default()
                .push(entry);
        }
        for entries in grouped.values_mut() {
            entries.sort_by(|a, b| a.measure.total_cmp(&b.measure));
        }
        grouped
    }

    /// Continuity problems on every route that has a pending event
    ///
    /// All events of such a route are checked, pending or not. Routes without problems are
    /// omitted.
    pub fn list_continuity_errors(&self, class: &EventClass) -> BTreeMap<String, Vec<ContinuityIssue>> {
        let route_ids: BTreeSet<RouteId> = class.pending().iter().map(|e| e.route_id).collect();
        let mut result = BTreeMap::new();
        for route_id in route_ids {
            let Some(route) = self.routes.get(route_id) else {
                continue;
            };
            let issues = class.continuity_issues(route, self.tolerance);
            if !issues.is_empty() {
                result.insert(route.name().to_string(), issues);
            }
        }
        result
    }
}
