use hashbrown::HashMap;
use itertools::Itertools;
use petgraph::graph::NodeIndex;

use super::{DegenerateInput, MetricsParams};
use crate::{model::StreetGraph, routing::Route};

/// Most used route nodes, by number of routes through them.
///
/// Ties are broken by node index so the selection is deterministic.
fn critical_nodes(routes: &[Route], fraction: f64, total_nodes: usize) -> Vec<NodeIndex> {
    let mut usage: HashMap<NodeIndex, usize> = HashMap::new();
    for route in routes {
        for node in route.nodes.iter().unique() {
            *usage.entry(*node).or_default() += 1;
        }
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let count = ((total_nodes as f64 * fraction).floor() as usize).max(1);

    usage
        .into_iter()
        .sorted_unstable_by(|(a, a_uses), (b, b_uses)| b_uses.cmp(a_uses).then(a.cmp(b)))
        .take(count)
        .map(|(node, _)| node)
        .collect()
}

#[allow(clippy::cast_precision_loss)]
pub(super) fn robustness_with_note(
    graph: &StreetGraph,
    routes: &[Route],
    params: &MetricsParams,
) -> (f64, Option<DegenerateInput>) {
    let total = graph.node_count();
    if total < params.min_robustness_nodes {
        return (params.neutral, Some(DegenerateInput::TooFewNodesForRobustness));
    }
    if routes.is_empty() {
        return (params.neutral, Some(DegenerateInput::NoRoutes));
    }

    let before = graph.weakly_connected_components();
    let mut damaged = graph.clone();
    for node in critical_nodes(routes, params.critical_fraction, total) {
        damaged.remove_node(node);
    }
    let after = damaged.weakly_connected_components();

    let increase = after as f64 - before as f64;
    let scale = (total as f64 / 100.0).max(1.0);
    ((1.0 - increase / scale).clamp(0.0, 1.0), None)
}

/// Connectivity left after removing the most used tenth of route nodes, in
/// `[0, 1]`.
///
/// Returns 0.5 for graphs under ten nodes or an empty route set.
pub fn robustness(graph: &StreetGraph, routes: &[Route]) -> f64 {
    robustness_with_note(graph, routes, &MetricsParams::default()).0
}
