// Starling: Contact-Plan Scheduling for Satellite Constellations
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Construction of the time-expanded graph over a contact plan.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use time::{Duration, OffsetDateTime};

use crate::types::{ContactPlan, LinkId, NodeId};

use super::PlanError;

/// A vertex of the time-expanded graph: a node at a specific point in time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Vertex {
    /// The network node.
    pub node: NodeId,
    /// The point in time.
    pub time: OffsetDateTime,
}

/// What a time-expanded edge represents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// Waiting on a node between two consecutive time points.
    Wait,
    /// Crossing the given link during one of its contact windows.
    Link(LinkId),
}

/// Weight of a time-expanded edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Cost of the edge: ceiling seconds of its duration, with a floor of 1. The floor avoids
    /// zero-cost edges and is part of the planner contract.
    pub cost: u64,
    /// Whether the edge waits or crosses a link.
    pub kind: EdgeKind,
}

/// The time-expanded graph of a planning problem.
#[derive(Debug)]
pub struct TimeExpandedGraph {
    /// The underlying directed graph.
    pub graph: DiGraph<Vertex, Edge>,
    /// Index from `(node, time)` to the graph vertex.
    pub index: HashMap<(NodeId, OffsetDateTime), NodeIndex>,
}

impl TimeExpandedGraph {
    /// Build the time-expanded graph for a source/destination pair over the given contact plan.
    ///
    /// Vertices are `(node, time)` pairs. Wait edges connect consecutive time points of the same
    /// node. Link edges connect `(a, win_start)` to `(b, win_end)` in both directions for every
    /// contact window clipped to `[start, end]`.
    pub fn build(
        plan: &ContactPlan,
        endpoints: &BTreeMap<LinkId, (NodeId, NodeId)>,
        src: &NodeId,
        dst: &NodeId,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Self, PlanError> {
        if src.is_empty() || dst.is_empty() {
            return Err(PlanError::EmptyEndpoint);
        }
        if start > end {
            return Err(PlanError::InvalidTimeRange { start, end });
        }

        // collect the time points of every node
        let mut time_points: BTreeMap<NodeId, BTreeSet<OffsetDateTime>> = BTreeMap::new();
        time_points.entry(src.clone()).or_default().insert(start);
        let dst_points = time_points.entry(dst.clone()).or_default();
        dst_points.insert(start);
        dst_points.insert(end);

        for (link, windows) in plan {
            let (a, b) = endpoints
                .get(link)
                .ok_or_else(|| PlanError::MissingEndpoints(link.clone()))?;
            for win in windows.iter().filter_map(|w| w.clipped(start, end)) {
                for node in [a, b] {
                    let points = time_points.entry(node.clone()).or_default();
                    points.insert(win.start);
                    points.insert(win.end);
                }
            }
        }

        // create all vertices
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for (node, points) in &time_points {
            for t in points {
                let idx = graph.add_node(Vertex {
                    node: node.clone(),
                    time: *t,
                });
                index.insert((node.clone(), *t), idx);
            }
        }

        // wait edges between consecutive time points of the same node
        for (node, points) in &time_points {
            for (t1, t2) in points.iter().zip(points.iter().skip(1)) {
                graph.add_edge(
                    index[&(node.clone(), *t1)],
                    index[&(node.clone(), *t2)],
                    Edge {
                        cost: ceil_seconds(*t2 - *t1),
                        kind: EdgeKind::Wait,
                    },
                );
            }
        }

        // link edges for every clipped contact window, in both directions
        for (link, windows) in plan {
            let (a, b) = &endpoints[link];
            for win in windows.iter().filter_map(|w| w.clipped(start, end)) {
                let cost = ceil_seconds(win.duration());
                for (from, to) in [(a, b), (b, a)] {
                    graph.add_edge(
                        index[&(from.clone(), win.start)],
                        index[&(to.clone(), win.end)],
                        Edge {
                            cost,
                            kind: EdgeKind::Link(link.clone()),
                        },
                    );
                }
            }
        }

        Ok(Self { graph, index })
    }
}

/// Round a duration up to full seconds, with a floor of 1.
fn ceil_seconds(d: Duration) -> u64 {
    let mut secs = d.whole_seconds();
    if d.subsec_nanoseconds() > 0 {
        secs += 1;
    }
    secs.max(1) as u64
}
