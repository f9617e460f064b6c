use std::collections::BinaryHeap;

use fixedbitset::FixedBitSet;
use hashbrown::HashMap;
use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};

use super::state::State;
use crate::{ComputeBudget, Error, model::StreetEdge, model::StreetGraph};

/// Heap pops between two budget checks
const BUDGET_CHECK_INTERVAL: usize = 1024;

/// Cheapest path found by [`dijkstra_path`]
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ShortestPath {
    pub(crate) cost: f64,
    pub(crate) nodes: Vec<NodeIndex>,
    pub(crate) edges: Vec<EdgeIndex>,
}

/// Dijkstra's algorithm between two nodes of the street network.
///
/// `weight` gives the cost of traversing an edge; edges with a non-finite
/// weight are treated as impassable. Returns `Ok(None)` when the target is
/// unreachable.
pub(crate) fn dijkstra_path<F>(
    graph: &StreetGraph,
    start: NodeIndex,
    target: NodeIndex,
    weight: F,
    budget: &ComputeBudget,
) -> Result<Option<ShortestPath>, Error>
where
    F: Fn(&StreetEdge) -> f64,
{
    if !graph.contains_node(start) || !graph.contains_node(target) {
        return Err(Error::InvalidNodeIndex);
    }

    // Estimate capacity based on graph size (adjust as needed)
    let estimated_nodes = graph.node_count().min(1000);
    let mut distances: HashMap<NodeIndex, f64> = HashMap::with_capacity(estimated_nodes);
    let mut predecessors: HashMap<NodeIndex, (NodeIndex, EdgeIndex)> =
        HashMap::with_capacity(estimated_nodes);
    let mut settled = FixedBitSet::with_capacity(graph.node_bound());
    let mut heap = BinaryHeap::with_capacity(estimated_nodes / 4);

    // Start node has distance 0
    heap.push(State {
        cost: 0.0,
        node: start,
    });
    distances.insert(start, 0.0);

    let mut popped = 0usize;
    while let Some(State { cost, node }) = heap.pop() {
        popped += 1;
        if popped % BUDGET_CHECK_INTERVAL == 0 {
            budget.check()?;
        }

        // Stale heap entry, a cheaper path was already settled
        if settled.put(node.index()) {
            continue;
        }

        if node == target {
            return Ok(Some(trace_back(start, target, cost, &predecessors)));
        }

        for edge in graph.edges(node) {
            let next = edge.target();
            if settled.contains(next.index()) {
                continue;
            }

            let edge_cost = weight(edge.weight());
            if !edge_cost.is_finite() {
                continue;
            }
            let next_cost = cost + edge_cost;

            // Add or update distance if better using Entry API
            match distances.entry(next) {
                hashbrown::hash_map::Entry::Vacant(entry) => {
                    entry.insert(next_cost);
                    heap.push(State {
                        cost: next_cost,
                        node: next,
                    });
                    predecessors.insert(next, (node, edge.id()));
                }
                hashbrown::hash_map::Entry::Occupied(mut entry) => {
                    if next_cost < *entry.get() {
                        *entry.get_mut() = next_cost;
                        heap.push(State {
                            cost: next_cost,
                            node: next,
                        });
                        predecessors.insert(next, (node, edge.id()));
                    }
                }
            }
        }
    }

    Ok(None)
}

/// Follow predecessors backward from target to start
fn trace_back(
    start: NodeIndex,
    target: NodeIndex,
    cost: f64,
    predecessors: &HashMap<NodeIndex, (NodeIndex, EdgeIndex)>,
) -> ShortestPath {
    let mut nodes = vec![target];
    let mut edges = Vec::new();
    let mut current = target;
    while current != start {
        let Some(&(prev, edge)) = predecessors.get(&current) else {
            break;
        };
        nodes.push(prev);
        edges.push(edge);
        current = prev;
    }
    nodes.reverse();
    edges.reverse();

    ShortestPath { cost, nodes, edges }
}
