use hashbrown::HashSet;
use petgraph::{graph::NodeIndex, visit::EdgeRef};

use crate::{model::StreetGraph, routing::Route};

/// Distinct street segments, each two-way pair of directed edges counted once
fn street_segments(graph: &StreetGraph) -> HashSet<(NodeIndex, NodeIndex)> {
    graph
        .edge_references()
        .filter(|edge| edge.source() != edge.target())
        .map(|edge| {
            let (a, b) = (edge.source(), edge.target());
            if a < b { (a, b) } else { (b, a) }
        })
        .collect()
}

/// `2|E| / (|V|(|V|-1))` over street segments, 0 for fewer than two nodes
#[allow(clippy::cast_precision_loss)]
pub fn network_density(graph: &StreetGraph) -> f64 {
    let nodes = graph.node_count();
    if nodes < 2 {
        return 0.0;
    }
    let segments = street_segments(graph).len() as f64;
    let nodes = nodes as f64;
    2.0 * segments / (nodes * (nodes - 1.0))
}

/// `1 / (1 + mean route node count / |V|)`, 0 without routes
#[allow(clippy::cast_precision_loss)]
pub fn route_efficiency(graph: &StreetGraph, routes: &[Route]) -> f64 {
    let nodes = graph.node_count();
    if routes.is_empty() || nodes == 0 {
        return 0.0;
    }
    let mean_len =
        routes.iter().map(Route::node_count).sum::<usize>() as f64 / routes.len() as f64;
    1.0 / (1.0 + mean_len / nodes as f64)
}

/// Queue proxy at the node with the most adjacent streets.
///
/// Degree is the number of distinct undirected neighbours, so a two-way street
/// adds one to each end rather than two.
#[allow(clippy::cast_precision_loss)]
pub fn max_queue_length(graph: &StreetGraph, queue_per_degree: f64) -> f64 {
    let mut neighbours: Vec<usize> = vec![0; graph.node_bound()];
    for (a, b) in street_segments(graph) {
        neighbours[a.index()] += 1;
        neighbours[b.index()] += 1;
    }
    let max_degree = neighbours.into_iter().max().unwrap_or(0);
    max_degree as f64 * queue_per_degree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreetEdge;

    #[test]
    fn two_way_street_counts_once() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0).unwrap();
        let b = graph.add_node(2, 0.001, 0.0).unwrap();
        graph.add_street(a, b, StreetEdge::new(50.0)).unwrap();
        graph.add_edge(a, b, StreetEdge::new(60.0)).unwrap();

        assert!((network_density(&graph) - 1.0).abs() < 1e-12);
        assert!((max_queue_length(&graph, 50.0) - 50.0).abs() < 1e-12);
    }

    #[test]
    fn one_way_edges_count_as_segments() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0).unwrap();
        let b = graph.add_node(2, 0.001, 0.0).unwrap();
        let c = graph.add_node(3, 0.002, 0.0).unwrap();
        graph.add_edge(a, b, StreetEdge::new(100.0)).unwrap();
        graph.add_edge(b, c, StreetEdge::new(100.0)).unwrap();

        assert!((network_density(&graph) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn queue_counts_neighbours_not_directed_edges() {
        let mut graph = StreetGraph::new();
        let hub = graph.add_node(1, 0.0, 0.0).unwrap();
        let north = graph.add_node(2, 0.0, 0.001).unwrap();
        let east = graph.add_node(3, 0.001, 0.0).unwrap();
        let south = graph.add_node(4, 0.0, -0.001).unwrap();
        graph.add_street(hub, north, StreetEdge::new(111.0)).unwrap();
        graph.add_street(hub, east, StreetEdge::new(111.0)).unwrap();
        graph.add_edge(south, hub, StreetEdge::new(111.0)).unwrap();

        assert_eq!(graph.edge_count(), 5);
        assert!((max_queue_length(&graph, 50.0) - 150.0).abs() < 1e-12);
    }

    #[test]
    fn route_efficiency_without_routes_is_zero() {
        let mut graph = StreetGraph::new();
        graph.add_node(1, 0.0, 0.0).unwrap();
        assert_eq!(route_efficiency(&graph, &[]), 0.0);
    }
}
