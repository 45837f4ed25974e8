//! Topology validation of the raw basesystem
//!
//! Every route's merged paths are matched against the node layer. The nodes decide the
//! part numbering (`sortnr`) and the direction of each path; anything that does not line
//! up marks the route invalid without stopping the run.

use crate::basesystem::{END_NODE, LineFeature, Node, RawNetwork, START_NODE};
use crate::log::LogSink;
use crate::{Part, Result, utils};
use geo::{Coord, LineString};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A per-route topology problem; it invalidates the route but not the run
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyIssue {
    /// Node count is not twice the path count
    NodeCountMismatch { paths: usize, nodes: usize },
    /// No node lies within tolerance of either end of the path
    NoNodeNearPath { path: u32 },
    /// The node list has no neighbour to pair with the matched node
    MissingPairedNode { path: u32 },
    /// The matched node and its pair carry different sortnrs
    SortnrMismatch { path: u32 },
    /// The paired node is too far from the opposite path end
    EndpointDistance { sortnr: u32 },
    /// Both nodes of a path have the same type
    SameNodeType { sortnr: u32 },
    /// The matched node is not a start node
    StartNodeType { sortnr: u32 },
    /// The paired node is not an end node
    EndNodeType { sortnr: u32 },
    /// Two paths were assigned the same sortnr
    DuplicateSortnr { sortnr: u32 },
}

impl fmt::Display for TopologyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyIssue::NodeCountMismatch { paths, nodes } => write!(
                f,
                "Number of paths ({paths}) does not match number of points ({nodes})"
            ),
            TopologyIssue::NoNodeNearPath { path } => write!(f, "Path {path}: No points found"),
            TopologyIssue::MissingPairedNode { path } => {
                write!(f, "Path {path}: No matching second point found")
            }
            TopologyIssue::SortnrMismatch { path } => {
                write!(f, "Path {path}: SortNr of points do not match")
            }
            TopologyIssue::EndpointDistance { sortnr } => write!(
                f,
                "SortNr {sortnr}: Start- or endpoint not in tolerated distance"
            ),
            TopologyIssue::SameNodeType { sortnr } => {
                write!(f, "SortNr {sortnr}: Start- and endpoint are of same type")
            }
            TopologyIssue::StartNodeType { sortnr } => {
                write!(f, "SortNr {sortnr}: Startpoint is not of correct type")
            }
            TopologyIssue::EndNodeType { sortnr } => {
                write!(f, "SortNr {sortnr}: Endpoint is not of correct type")
            }
            TopologyIssue::DuplicateSortnr { sortnr } => {
                write!(f, "SortNr {sortnr}: assigned to more than one path")
            }
        }
    }
}

/// A merged path after validation
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedPath {
    /// Position of the path in merge order (1-based)
    pub pathnr: u32,
    /// Part number derived from the nodes
    pub sortnr: u32,
    /// Geometry, reversed if the nodes say so
    pub geometry: LineString<f64>,
    pub reversed: bool,
}

/// Validation result of one route
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedRoute {
    pub name: String,
    pub valid: bool,
    pub paths: Vec<ValidatedPath>,
    pub issues: Vec<TopologyIssue>,
}

impl ValidatedRoute {
    /// Paths as route parts
    pub fn parts(&self) -> Vec<Part> {
        self.paths
            .iter()
            .map(|path| Part::new(path.sortnr, path.geometry.clone()))
            .collect()
    }

    fn invalidate(&mut self, issue: TopologyIssue, log: &mut dyn LogSink) {
        log.error(&format!(
            "Route {}: {issue}, route not valid",
            self.name
        ));
        self.valid = false;
        self.issues.push(issue);
    }
}

/// Validation result of a whole basesystem
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TopologyReport {
    pub basesystem_id: u32,
    /// All routes with at least one line feature, by name
    pub routes: BTreeMap<String, ValidatedRoute>,
    /// Node route names without any line feature
    pub orphans: Vec<String>,
}

impl TopologyReport {
    pub fn valid_routes(&self) -> impl Iterator<Item = &ValidatedRoute> {
        self.routes.values().filter(|route| route.valid)
    }

    pub fn invalid_count(&self) -> usize {
        self.routes.values().filter(|route| !route.valid).count()
    }
}

/// Derives route topology from a raw network
#[derive(Clone, Copy, Debug)]
pub struct TopologyValidator {
    tolerance: f64,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl TopologyValidator {
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Validate a raw network
    ///
    /// # Returns
    /// The per-route result, or [`crate::LrsError::FatalValidation`] if required fields are
    /// missing. Route problems are reported inside the [`TopologyReport`].
    pub fn validate(&self, network: &RawNetwork, log: &mut dyn LogSink) -> Result<TopologyReport> {
        #[cfg(feature = "profiling")]
        profiling::scope!("topology::validate");

        network.data_check(log)?;
        log.inform("Check topology of basesystem");

        let mut merged = network.merged_paths();
        // Loops must be assembled while a looping route still has a single path
        for name in network.loop_routes() {
            let Some(paths) = merged.get_mut(&name) else {
                continue;
            };
            if paths.len() == 1 && utils::is_closed(&paths[0]) {
                if let Some(ring) = assemble_loop(&network.route_lines(&name)) {
                    tracing::debug!(route = %name, "assembled loop");
                    paths[0] = ring;
                }
            }
        }

        let mut report = TopologyReport {
            basesystem_id: network.basesystem_id,
            ..Default::default()
        };
        for (name, paths) in merged {
            let nodes = network.route_nodes(&name);
            let route = self.validate_route(name, paths, &nodes, log);
            report.routes.insert(route.name.clone(), route);
        }

        let line_names: BTreeSet<String> = report.routes.keys().cloned().collect();
        for orphan in network.node_route_names().difference(&line_names) {
            log.error(&format!("Route {orphan}: Points without LineString"));
            report.orphans.push(orphan.clone());
        }

        tracing::info!(
            routes = report.routes.len(),
            invalid = report.invalid_count(),
            orphans = report.orphans.len(),
            "topology checked"
        );
        Ok(report)
    }

    fn validate_route(
        &self,
        name: String,
        paths: Vec<LineString<f64>>,
        nodes: &[Node],
        log: &mut dyn LogSink,
    ) -> ValidatedRoute {
        let mut route = ValidatedRoute {
            name,
            valid: true,
            paths: paths
                .into_iter()
                .zip(1u32..)
                .map(|(geometry, pathnr)| ValidatedPath {
                    pathnr,
                    sortnr: pathnr,
                    geometry,
                    reversed: false,
                })
                .collect(),
            issues: Vec::new(),
        };

        if nodes.len() != 2 * route.paths.len() {
            let issue = TopologyIssue::NodeCountMismatch {
                paths: route.paths.len(),
                nodes: nodes.len(),
            };
            route.invalidate(issue, log);
            return route;
        }

        for index in 0..route.paths.len() {
            self.validate_path(&mut route, index, nodes, log);
        }

        let mut seen = BTreeSet::new();
        for sortnr in route.paths.iter().map(|path| path.sortnr).collect::<Vec<_>>() {
            if !seen.insert(sortnr) {
                route.invalidate(TopologyIssue::DuplicateSortnr { sortnr }, log);
            }
        }
        route
    }

    fn validate_path(
        &self,
        route: &mut ValidatedRoute,
        index: usize,
        nodes: &[Node],
        log: &mut dyn LogSink,
    ) {
        let pathnr = route.paths[index].pathnr;
        let (Some(start), Some(end)) = (
            route.paths[index].geometry.0.first().copied(),
            route.paths[index].geometry.0.last().copied(),
        ) else {
            route.invalidate(TopologyIssue::NoNodeNearPath { path: pathnr }, log);
            return;
        };

        let Some((pos, same_direction)) = self.first_node_near(nodes, start, end) else {
            route.invalidate(TopologyIssue::NoNodeNearPath { path: pathnr }, log);
            return;
        };
        let found = &nodes[pos];
        let paired_pos = if found.node_type == START_NODE {
            pos.checked_add(1)
        } else {
            pos.checked_sub(1)
        };
        let Some(paired) = paired_pos.and_then(|k| nodes.get(k)) else {
            route.invalidate(TopologyIssue::MissingPairedNode { path: pathnr }, log);
            return;
        };

        if paired.sortnr != found.sortnr {
            route.invalidate(TopologyIssue::SortnrMismatch { path: pathnr }, log);
        } else if found.sortnr != pathnr {
            log.inform(&format!(
                "Route {}, Path {pathnr}: Path-Nr of route will be changed to {}",
                route.name, found.sortnr
            ));
            route.paths[index].sortnr = found.sortnr;
        }

        let other_end = if same_direction { end } else { start };
        let sortnr = found.sortnr;
        if utils::distance(paired.point, other_end) > self.tolerance {
            route.invalidate(TopologyIssue::EndpointDistance { sortnr }, log);
        }
        if paired.node_type == found.node_type {
            route.invalidate(TopologyIssue::SameNodeType { sortnr }, log);
        }
        if found.node_type != START_NODE {
            route.invalidate(TopologyIssue::StartNodeType { sortnr }, log);
        }
        if paired.node_type != END_NODE {
            route.invalidate(TopologyIssue::EndNodeType { sortnr }, log);
        }

        if utils::distance(found.point, paired.point) <= self.tolerance {
            log.inform(&format!(
                "Route {}, SortNr {sortnr}: Start- and endpoint have identical positions",
                route.name
            ));
        }

        if !same_direction {
            log.inform(&format!(
                "Route {}, Path {pathnr}: LineString in reversed direction",
                route.name
            ));
            let path = &mut route.paths[index];
            path.geometry.0.reverse();
            path.reversed = true;
        }
    }

    /// First node within tolerance of the path start (same direction) or end (reversed)
    fn first_node_near(
        &self,
        nodes: &[Node],
        start: Coord<f64>,
        end: Coord<f64>,
    ) -> Option<(usize, bool)> {
        nodes.iter().enumerate().find_map(|(pos, node)| {
            if utils::distance(node.point, start) <= self.tolerance {
                Some((pos, true))
            } else if utils::distance(node.point, end) <= self.tolerance {
                Some((pos, false))
            } else {
                None
            }
        })
    }
}

/// Rebuild a closed route from its raw features
///
/// The shared vertex is stripped from the lowest-id feature, the features are chained in
/// id order and the shared vertex is put back at the front, closing the ring there.
fn assemble_loop(lines: &[&LineFeature]) -> Option<LineString<f64>> {
    let (first, rest) = lines.split_first()?;
    let shared = *first.geometry.0.first()?;
    let mut coords: Vec<Coord<f64>> = first.geometry.0.iter().skip(1).copied().collect();
    if coords.is_empty() {
        return None;
    }

    let mut remaining: Vec<&LineFeature> = rest
        .iter()
        .copied()
        .filter(|line| !line.geometry.0.is_empty())
        .collect();
    while !remaining.is_empty() {
        let tail = *coords.last()?;
        let next = remaining
            .iter()
            .position(|line| {
                line.geometry.0.first() == Some(&tail) || line.geometry.0.last() == Some(&tail)
            })
            .unwrap_or(0);
        let mut segment = remaining.remove(next).geometry.0.clone();
        if segment.first() != Some(&tail) && segment.last() == Some(&tail) {
            segment.reverse();
        }
        if segment.first() == Some(&tail) {
            segment.remove(0);
        }
        coords.extend(segment);
    }
    coords.insert(0, shared);
    Some(LineString::from(coords))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basesystem::{LineFeature, NodeFeature};
    use crate::{LrsError, RunLog, Severity};

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

    /// Two disjoint paths; the second in input order is part 1 according to the nodes
    fn two_path_network() -> RawNetwork {
        RawNetwork {
            basesystem_id: 7,
            lines: vec![
                line(1, "R", &[(200.0, 0.0), (300.0, 0.0)]),
                line(2, "R", &[(0.0, 0.0), (100.0, 0.0)]),
            ],
            nodes: vec![
                node(1, "R", 2, 1, 200.0, 0.0),
                node(2, "R", 2, 2, 300.0, 0.0),
                node(3, "R", 1, 1, 0.0, 0.0),
                node(4, "R", 1, 2, 100.0, 0.0),
            ],
        }
    }

    #[test]
    fn test_valid_route_takes_sortnr_from_nodes() {
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&two_path_network(), &mut log)
            .unwrap();
        let route = &report.routes["R"];
        assert!(route.valid);
        assert_eq!(route.paths.len(), 2);
        assert_eq!(route.paths[0].sortnr, 2);
        assert_eq!(route.paths[1].sortnr, 1);
        assert!(log.contains(Severity::Inform, "Path-Nr of route will be changed"));
        assert_eq!(log.errors(), 0);
        assert_eq!(report.basesystem_id, 7);
    }

    #[test]
    fn test_missing_node_invalidates_route() {
        let mut network = two_path_network();
        network.nodes.pop();
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut log)
            .unwrap();
        let route = &report.routes["R"];
        assert!(!route.valid);
        assert_eq!(
            route.issues,
            vec![TopologyIssue::NodeCountMismatch { paths: 2, nodes: 3 }]
        );
        assert_eq!(log.errors(), 1);
    }

    #[test]
    fn test_reversed_path_is_normalized() {
        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(10.0, 0.0), (0.0, 0.0)])],
            nodes: vec![node(1, "R", 1, 1, 0.0, 0.0), node(2, "R", 1, 2, 10.0, 0.0)],
        };
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut log)
            .unwrap();
        let path = &report.routes["R"].paths[0];
        assert!(report.routes["R"].valid);
        assert!(path.reversed);
        assert_eq!(path.geometry.0[0], Coord { x: 0.0, y: 0.0 });
        assert!(log.contains(Severity::Inform, "reversed direction"));
    }

    #[test]
    fn test_each_type_violation_is_reported() {
        // Both nodes typed as end nodes
        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(0.0, 0.0), (10.0, 0.0)])],
            nodes: vec![node(1, "R", 1, 2, 0.0, 0.0), node(2, "R", 1, 2, 10.0, 0.0)],
        };
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut log)
            .unwrap();
        let route = &report.routes["R"];
        assert!(!route.valid);
        // Found node at index 0 is an end node, so its pair would be at index -1
        assert_eq!(
            route.issues,
            vec![TopologyIssue::MissingPairedNode { path: 1 }]
        );

        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(0.0, 0.0), (10.0, 0.0)])],
            nodes: vec![node(1, "R", 1, 1, 0.0, 0.0), node(2, "R", 1, 1, 10.0, 0.0)],
        };
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut RunLog::new())
            .unwrap();
        assert_eq!(
            report.routes["R"].issues,
            vec![
                TopologyIssue::SameNodeType { sortnr: 1 },
                TopologyIssue::EndNodeType { sortnr: 1 }
            ]
        );
    }

    #[test]
    fn test_sortnr_mismatch_and_endpoint_distance() {
        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(0.0, 0.0), (10.0, 0.0)])],
            nodes: vec![node(1, "R", 1, 1, 0.0, 0.0), node(2, "R", 2, 2, 12.0, 0.0)],
        };
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut RunLog::new())
            .unwrap();
        assert_eq!(
            report.routes["R"].issues,
            vec![
                TopologyIssue::SortnrMismatch { path: 1 },
                TopologyIssue::EndpointDistance { sortnr: 1 }
            ]
        );
    }

    #[test]
    fn test_no_node_near_path() {
        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![line(1, "R", &[(0.0, 0.0), (10.0, 0.0)])],
            nodes: vec![node(1, "R", 1, 1, 50.0, 0.0), node(2, "R", 1, 2, 60.0, 0.0)],
        };
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut RunLog::new())
            .unwrap();
        assert_eq!(
            report.routes["R"].issues,
            vec![TopologyIssue::NoNodeNearPath { path: 1 }]
        );
    }

    #[test]
    fn test_orphan_nodes_reported() {
        let mut network = two_path_network();
        network.nodes.push(node(9, "Ghost", 1, 1, 0.0, 0.0));
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut log)
            .unwrap();
        assert_eq!(report.orphans, vec!["Ghost".to_string()]);
        assert!(log.contains(Severity::Error, "Points without LineString"));
    }

    #[test]
    fn test_missing_fields_abort() {
        let mut network = two_path_network();
        network.nodes[0].node_type = None;
        let result = TopologyValidator::new(0.01).validate(&network, &mut RunLog::new());
        assert!(matches!(result, Err(LrsError::FatalValidation(_))));
    }

    #[test]
    fn test_loop_route_is_assembled_from_lowest_id() {
        // Square ring split into three features, merge seed would start elsewhere
        let mut a = line(5, "L", &[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        a.pathnr = Some(2);
        let b = line(9, "L", &[(10.0, 10.0), (0.0, 10.0)]);
        let c = line(7, "L", &[(0.0, 10.0), (0.0, 0.0)]);
        let network = RawNetwork {
            basesystem_id: 1,
            lines: vec![a, b, c],
            nodes: vec![node(1, "L", 1, 1, 0.0, 0.0), node(2, "L", 1, 2, 0.0, 0.0)],
        };
        let mut log = RunLog::new();
        let report = TopologyValidator::new(0.01)
            .validate(&network, &mut log)
            .unwrap();
        let route = &report.routes["L"];
        assert!(route.valid);
        assert_eq!(
            route.paths[0].geometry,
            LineString::from(vec![
                (0.0, 0.0),
                (10.0, 0.0),
                (10.0, 10.0),
                (0.0, 10.0),
                (0.0, 0.0)
            ])
        );
        assert!(log.contains(Severity::Inform, "identical positions"));
    }
}
