//! Raw basesystem network: line and node features as delivered by the external source
//!
//! The core only reads this data. It checks required fields, merges the line features of
//! each route into maximal paths and finds nodes that mark closed loops.

use crate::log::LogSink;
use crate::{LrsError, Result, utils};
use geo::{Coord, LineString};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Node type marking the start of a path
pub const START_NODE: i32 = 1;
/// Node type marking the end of a path
pub const END_NODE: i32 = 2;

/// A raw line feature of the basesystem
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LineFeature {
    pub id: i64,
    pub route_name: Option<String>,
    pub geometry: LineString<f64>,
    /// Optional path number, only used to order merge seeds
    #[cfg_attr(feature = "serde", serde(default))]
    pub pathnr: Option<u32>,
}

/// A raw node feature of the basesystem
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeFeature {
    pub id: i64,
    pub route_name: Option<String>,
    pub sortnr: Option<u32>,
    /// [`START_NODE`] or [`END_NODE`]
    pub node_type: Option<i32>,
    pub point: Coord<f64>,
}

/// A node whose required fields are all present
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Node {
    pub id: i64,
    pub sortnr: u32,
    pub node_type: i32,
    pub point: Coord<f64>,
}

/// The complete raw input of a route update
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawNetwork {
    pub basesystem_id: u32,
    pub lines: Vec<LineFeature>,
    pub nodes: Vec<NodeFeature>,
}

fn trimmed(name: &Option<String>) -> Option<&str> {
    name.as_deref().map(str::trim).filter(|name| !name.is_empty())
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RawNetwork {
    /// Verify that every required field is present
    ///
    /// Each missing field is logged as an error. Any missing field aborts the run with
    /// [`LrsError::FatalValidation`] before anything is modified.
    pub fn data_check(&self, log: &mut dyn LogSink) -> Result<()> {
        let mut issues = Vec::new();
        let mut count = |what: &str, n: usize| {
            if n > 0 {
                issues.push(format!("{what} ({n} features)"));
            }
        };
        count(
            "line route name is NULL",
            self.lines.iter().filter(|l| trimmed(&l.route_name).is_none()).count(),
        );
        count(
            "node route name is NULL",
            self.nodes.iter().filter(|n| trimmed(&n.route_name).is_none()).count(),
        );
        count(
            "node sortnr is NULL",
            self.nodes.iter().filter(|n| n.sortnr.is_none()).count(),
        );
        count(
            "node type is NULL",
            self.nodes.iter().filter(|n| n.node_type.is_none()).count(),
        );
        if issues.is_empty() {
            return Ok(());
        }
        for issue in &issues {
            log.error(&format!("Basesystem: {issue}"));
        }
        log.error("Route update aborted");
        Err(LrsError::FatalValidation(issues))
    }

    /// Names of all routes that have at least one line feature
    pub fn line_route_names(&self) -> BTreeSet<String> {
        self.lines
            .iter()
            .filter_map(|line| trimmed(&line.route_name).map(str::to_string))
            .collect()
    }

    /// Names of all routes that have at least one node
    pub fn node_route_names(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter_map(|node| trimmed(&node.route_name).map(str::to_string))
            .collect()
    }

    /// Line features of a route, ordered by feature id
    pub fn route_lines(&self, route_name: &str) -> Vec<&LineFeature> {
        let mut lines: Vec<&LineFeature> = self
            .lines
            .iter()
            .filter(|line| trimmed(&line.route_name) == Some(route_name))
            .collect();
        lines.sort_by_key(|line| line.id);
        lines
    }

    /// Nodes of a route, sorted by sortnr then type
    pub(crate) fn route_nodes(&self, route_name: &str) -> Vec<Node> {
        let mut nodes: Vec<Node> = self
            .nodes
            .iter()
            .filter(|node| trimmed(&node.route_name) == Some(route_name))
            .filter_map(|node| {
                Some(Node {
                    id: node.id,
                    sortnr: node.sortnr?,
                    node_type: node.node_type?,
                    point: node.point,
                })
            })
            .collect();
        nodes.sort_by_key(|node| (node.sortnr, node.node_type));
        nodes
    }

    /// Merge the line features of every route into maximal paths
    ///
    /// Paths of a route are numbered by their position in the returned vector (1-based).
    pub fn merged_paths(&self) -> BTreeMap<String, Vec<LineString<f64>>> {
        self.line_route_names()
            .into_iter()
            .map(|name| {
                let lines = self.route_lines(&name);
                let paths = merge_lines(&lines);
                (name, paths)
            })
            .collect()
    }

    /// Routes whose nodes contain two distinct nodes of the same sortnr at exactly the same
    /// position, which marks a closed loop
    pub fn loop_routes(&self) -> BTreeSet<String> {
        let mut seen: HashMap<(String, u32, (u64, u64)), i64> = HashMap::new();
        let mut loops = BTreeSet::new();
        for node in &self.nodes {
            let (Some(name), Some(sortnr)) = (trimmed(&node.route_name), node.sortnr) else {
                continue;
            };
            let key = (name.to_string(), sortnr, utils::coord_key(node.point));
            match seen.get(&key) {
                Some(id) if *id != node.id => {
                    loops.insert(name.to_string());
                }
                Some(_) => {}
                None => {
                    seen.insert(key, node.id);
                }
            }
        }
        loops
    }
}

/// Join line features at endpoints shared by exactly two line ends
///
/// Seeds are taken in `(pathnr, id)` order; each seed is extended forward from its end and
/// then backward from its start. Lines are reversed as needed to continue a path.
pub fn merge_lines(lines: &[&LineFeature]) -> Vec<LineString<f64>> {
    let mut order: Vec<usize> = (0..lines.len())
        .filter(|&i| !lines[i].geometry.0.is_empty())
        .collect();
    order.sort_by_key(|&i| (lines[i].pathnr.unwrap_or(1), lines[i].id));

    let mut ends: HashMap<(u64, u64), Vec<usize>> = HashMap::new();
    for &i in &order {
        let coords = &lines[i].geometry.0;
        for coord in [coords[0], coords[coords.len() - 1]] {
            ends.entry(utils::coord_key(coord)).or_default().push(i);
        }
    }

    let mut used = vec![false; lines.len()];
    let mut paths = Vec::new();
    for &seed in &order {
        if used[seed] {
            continue;
        }
        used[seed] = true;
        let mut coords: Vec<Coord<f64>> = lines[seed].geometry.0.clone();

        // Forward
        while let Some(next) = continuation(&ends, &used, coords[coords.len() - 1]) {
            used[next] = true;
            let mut segment = lines[next].geometry.0.clone();
            if segment[0] != coords[coords.len() - 1] {
                segment.reverse();
            }
            coords.extend(segment.into_iter().skip(1));
        }
        // Backward
        while let Some(prev) = continuation(&ends, &used, coords[0]) {
            used[prev] = true;
            let mut segment = lines[prev].geometry.0.clone();
            if segment[segment.len() - 1] != coords[0] {
                segment.reverse();
            }
            segment.pop();
            segment.extend(coords);
            coords = segment;
        }
        paths.push(LineString::from(coords));
    }
    paths
}

/// The unused line continuing a path at `at`, if exactly two line ends meet there
fn continuation(
    ends: &HashMap<(u64, u64), Vec<usize>>,
    used: &[bool],
    at: Coord<f64>,
) -> Option<usize> {
    let touching = ends.get(&utils::coord_key(at))?;
    if touching.len() != 2 {
        return None;
    }
    touching.iter().copied().find(|&i| !used[i])
}
