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

//! Shortest time-respecting path search over the time-expanded graph.
//!
//! The planner is a bounded heuristic: it minimizes the total edge cost (time dilation plus
//! transit) over the sampled contact plan and makes no claim of global optimality.

use std::collections::BTreeMap;

use log::debug;
use petgraph::algo::{astar, dijkstra};
use thiserror::Error;
use time::OffsetDateTime;

use crate::types::{ContactPlan, LinkId, NodeId, Path, PathHop};

pub mod graph;

pub use graph::TimeExpandedGraph;
use graph::EdgeKind;

/// Compute a time-respecting path from `(src, start)` to any `(dst, t <= end)` that minimizes the
/// total edge cost, breaking ties by earliest arrival. Only link edges of the time-expanded graph
/// become hops of the returned path.
pub fn plan_path(
    plan: &ContactPlan,
    endpoints: &BTreeMap<LinkId, (NodeId, NodeId)>,
    src: &NodeId,
    dst: &NodeId,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Result<Path, PlanError> {
    let teg = TimeExpandedGraph::build(plan, endpoints, src, dst, start, end)?;
    let source = teg.index[&(src.clone(), start)];

    // all costs from the source, then the cheapest (and earliest) reachable destination vertex
    let costs = dijkstra(&teg.graph, source, None, |e| e.weight().cost);
    let target = teg
        .graph
        .node_indices()
        .filter(|&i| {
            let v = &teg.graph[i];
            v.node == *dst && v.time <= end
        })
        .filter_map(|i| costs.get(&i).map(|c| (i, *c)))
        .min_by_key(|&(i, c)| (c, teg.graph[i].time))
        .map(|(i, _)| i)
        .ok_or_else(|| no_path(src, dst))?;

    // extract the concrete vertex sequence towards that exact target
    let (cost, vertices) = astar(
        &teg.graph,
        source,
        |n| n == target,
        |e| e.weight().cost,
        |_| 0,
    )
    .ok_or_else(|| no_path(src, dst))?;

    // keep only the link edges, in order
    let mut hops = Vec::new();
    for (&u, &v) in vertices.iter().zip(vertices.iter().skip(1)) {
        let edge = teg
            .graph
            .edges_connecting(u, v)
            .min_by_key(|e| e.weight().cost)
            .ok_or_else(|| no_path(src, dst))?;
        if let EdgeKind::Link(link) = &edge.weight().kind {
            hops.push(PathHop {
                from: teg.graph[u].node.clone(),
                to: teg.graph[v].node.clone(),
                link: link.clone(),
                start: teg.graph[u].time,
                end: teg.graph[v].time,
            });
        }
    }

    debug!(
        "Planned path {src} -> {dst} with {} hops at cost {cost}",
        hops.len()
    );
    Path::from_hops(hops).ok_or_else(|| no_path(src, dst))
}

/// Shorthand to construct a [`PlanError::NoPath`].
fn no_path(src: &NodeId, dst: &NodeId) -> PlanError {
    PlanError::NoPath {
        src: src.clone(),
        dst: dst.clone(),
    }
}

/// Error of the path planner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The source or destination node ID is empty.
    #[error("Source or destination node ID is empty")]
    EmptyEndpoint,
    /// The planning interval is inverted.
    #[error("Planning interval starts at {start} but ends at {end}")]
    InvalidTimeRange {
        /// Requested start of the interval.
        start: OffsetDateTime,
        /// Requested end of the interval.
        end: OffsetDateTime,
    },
    /// The contact plan references a link with unknown endpoints.
    #[error("No endpoints known for link {0}")]
    MissingEndpoints(LinkId),
    /// No time-respecting path exists within the interval.
    #[error("No time-respecting path from {src} to {dst}")]
    NoPath {
        /// Source node.
        src: NodeId,
        /// Destination node.
        dst: NodeId,
    },
}
