//! LRS Library - Linear Referencing Core
//!
//! This library maintains a linear referencing system: named multi-part routes and the events
//! located along them by measure. Its job is to keep event measures, positions and azimuths
//! consistent whenever the route geometry changes, and to derive a valid, consistently
//! directed route topology from a raw line and node network in the first place.
//!
//! # Architecture
//!
//! - **[`Route`]**: Multi-part polyline with cached lengths; projects points to measures
//! - **[`RawNetwork`]**: Externally owned basesystem lines and nodes, with data check and line merging
//! - **[`TopologyValidator`]**: Derives part order and direction per route from the node layer
//! - **[`RouteCollection`]**: Stored routes and their synchronization against a validated basesystem
//! - **[`EventClass`]**: Point, continuous and tour events, each synchronized with the same policy
//! - **[`overlaps`]**: Measure interval overlap predicate for tour parts
//! - **[`ApprovalState`]** / **[`ApprovalGate`]**: Pending/approved workflow for synchronized events
//! - **[`Project`]**: Configuration plus orchestration of a complete route update run
//!
//! # Data flow
//!
//! raw network → data check → topology → route synchronization → event synchronization
//! per updated route → approval state transitions.

mod approval;
mod basesystem;
mod collection;
pub mod events;
mod log;
mod overlap;
mod project;
mod route;
mod topology;
pub mod utils;

// Public API exports
pub use approval::{ApprovalGate, ApprovalState, ContinuityIssue, IssueKind, PendingEntry};
pub use basesystem::{END_NODE, LineFeature, NodeFeature, RawNetwork, START_NODE};
pub use collection::{BlockedDeletion, RouteCollection, RouteSyncOutcome};
pub use events::{
    BasePoint, ContinuousEvent, ContinuousEventClass, EndpointKind, EventClass, EventClassKind,
    EventName, EventNameId, EventNameRegistry, MoveBounds, PointEventClass, SyncAction, SyncStats,
    Synchronize, TourEndpoint, TourEventClass, TourPart,
};
pub use log::{LogEntry, LogSink, RunLog, Severity, TracingLog};
pub use overlap::overlaps;
pub use project::{Project, ProjectConfig, RouteUpdateOutcome};
pub use route::{Part, Projection, Route, RouteId};
pub use topology::{TopologyIssue, TopologyReport, TopologyValidator, ValidatedPath, ValidatedRoute};

use uuid::Uuid;

/// Error types for the LRS core
#[derive(Debug, thiserror::Error)]
pub enum LrsError {
    #[error("Route update aborted, required basesystem fields are missing: {}", .0.join("; "))]
    FatalValidation(Vec<String>),

    #[error("Route {0} has no parts")]
    EmptyRoute(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Route {route} has no part {sortnr}")]
    UnknownPart { route: String, sortnr: u32 },

    #[error("Unknown route: {0}")]
    UnknownRoute(String),

    #[error("Unknown event: {0}")]
    UnknownEvent(Uuid),

    #[error("Unknown event class: {0}")]
    UnknownEventClass(String),

    #[error("Inconsistent data: {0}")]
    InconsistentData(String),

    #[error("Overlapping Tour Parts: {0}")]
    OverlapRejected(String),

    #[error("{0}")]
    EditRejected(String),

    #[error("Invalid event name id: {0}")]
    InvalidEventNameId(String),

    #[error("Event Name already exists: {0}")]
    DuplicateEventName(String),

    #[error("Unknown event name: {0}")]
    UnknownEventName(String),
}

pub type Result<T> = std::result::Result<T, LrsError>;
