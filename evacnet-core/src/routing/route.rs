use itertools::Itertools;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::dijkstra::ShortestPath;
use crate::{
    Error,
    algo::capacity::CapacityModel,
    model::{OsmNodeId, StreetGraph},
};

/// How a route was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteKind {
    /// Cheapest path under the evacuation cost
    Evacuation,
    /// Shortest path by distance, used when the evacuation search failed
    DistanceFallback,
}

/// Path from a population source to a safe destination.
///
/// Length and capacity are derived from the traversed edges when the route is
/// built and never change afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub nodes: Vec<NodeIndex>,
    pub edges: Vec<EdgeIndex>,
    /// Sum of edge lengths in meters
    pub length_meters: f64,
    /// Bottleneck capacity in people per minute, 0 for a route without edges
    pub capacity_people_per_minute: f64,
    /// Sum of evacuation costs in seconds
    pub cost_seconds: f64,
    pub kind: RouteKind,
}

impl Route {
    pub(crate) fn from_search(
        graph: &StreetGraph,
        model: &CapacityModel,
        path: ShortestPath,
        kind: RouteKind,
    ) -> Self {
        let mut route = Self {
            nodes: path.nodes,
            edges: path.edges,
            length_meters: 0.0,
            capacity_people_per_minute: 0.0,
            cost_seconds: 0.0,
            kind,
        };
        route.derive_attributes(graph, model);
        route
    }

    /// Builds a route along the given nodes.
    ///
    /// Between two consecutive nodes the cheapest parallel edge is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the sequence is empty or two consecutive nodes are
    /// not connected
    pub fn from_nodes(
        graph: &StreetGraph,
        model: &CapacityModel,
        nodes: Vec<NodeIndex>,
    ) -> Result<Self, Error> {
        let Some(&first) = nodes.first() else {
            return Err(Error::InvalidData("Route needs at least one node".into()));
        };
        if !graph.contains_node(first) {
            return Err(Error::InvalidNodeIndex);
        }

        let edges = nodes
            .iter()
            .tuple_windows()
            .map(|(&from, &to)| {
                graph
                    .edges_between(from, to)
                    .min_by(|a, b| {
                        model
                            .evacuation_cost(a.weight())
                            .total_cmp(&model.evacuation_cost(b.weight()))
                    })
                    .map(|edge| edge.id())
                    .ok_or_else(|| {
                        Error::InvalidData(format!(
                            "No edge between nodes {} and {}",
                            from.index(),
                            to.index()
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut route = Self {
            nodes,
            edges,
            length_meters: 0.0,
            capacity_people_per_minute: 0.0,
            cost_seconds: 0.0,
            kind: RouteKind::Evacuation,
        };
        route.derive_attributes(graph, model);
        Ok(route)
    }

    fn derive_attributes(&mut self, graph: &StreetGraph, model: &CapacityModel) {
        let edges: Vec<_> = self.edges.iter().filter_map(|&e| graph.edge(e)).collect();

        self.length_meters = edges.iter().map(|edge| edge.length).sum();
        self.cost_seconds = edges.iter().map(|edge| model.evacuation_cost(edge)).sum();
        self.capacity_people_per_minute = edges
            .iter()
            .map(|edge| model.edge_capacity(edge))
            .min_by(f64::total_cmp)
            .unwrap_or(0.0);
    }

    pub fn source(&self) -> Option<NodeIndex> {
        self.nodes.first().copied()
    }

    pub fn destination(&self) -> Option<NodeIndex> {
        self.nodes.last().copied()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Source and destination are the same node
    pub fn is_trivial(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn osm_ids(&self, graph: &StreetGraph) -> Vec<OsmNodeId> {
        self.nodes
            .iter()
            .filter_map(|&n| graph.node(n).map(|node| node.id))
            .collect()
    }

    /// Haversine distance between source and destination in meters
    pub fn straight_line_distance(&self, graph: &StreetGraph) -> f64 {
        match (self.source(), self.destination()) {
            (Some(source), Some(destination)) => {
                graph.node_distance(source, destination).unwrap_or(0.0)
            }
            _ => 0.0,
        }
    }

    /// Straight-line distance over route length, 1 for a perfectly direct route
    pub fn directness(&self, graph: &StreetGraph) -> f64 {
        if self.length_meters <= 0.0 {
            return 0.0;
        }
        (self.straight_line_distance(graph) / self.length_meters).clamp(0.0, 1.0)
    }
}
