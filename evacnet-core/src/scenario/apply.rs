use std::ops::Deref;

use geo::{Intersects, Point};
use hashbrown::HashSet;
use log::debug;
use petgraph::{
    graph::{EdgeIndex, NodeIndex},
    visit::EdgeRef,
};
use serde::Serialize;

use super::perturbation::{ClosureTarget, Perturbation, ScenarioPerturbation};
use crate::{
    Error,
    model::{StreetGraph, streets::haversine_distance},
};

/// What a set of perturbations changed on the copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerturbationSummary {
    pub removed_nodes: usize,
    pub removed_edges: usize,
    pub scaled_edges: usize,
    pub protected_edges: usize,
}

/// Perturbed copy of a base street graph
#[derive(Debug, Clone)]
pub struct ModifiedGraph {
    graph: StreetGraph,
    summary: PerturbationSummary,
}

impl ModifiedGraph {
    pub fn graph(&self) -> &StreetGraph {
        &self.graph
    }

    pub fn summary(&self) -> PerturbationSummary {
        self.summary
    }

    pub fn into_inner(self) -> StreetGraph {
        self.graph
    }
}

impl Deref for ModifiedGraph {
    type Target = StreetGraph;

    fn deref(&self) -> &Self::Target {
        &self.graph
    }
}

/// Applies perturbations to a copy of `base`; the base graph is never touched.
///
/// Closures go first, then capacity changes, then protected corridors, so
/// multipliers on the same edge compose regardless of input order.
///
/// # Errors
///
/// Returns [`Error::InvalidPerturbation`] if any perturbation is invalid
pub fn apply(base: &StreetGraph, perturbations: &[Perturbation]) -> Result<ModifiedGraph, Error> {
    for perturbation in perturbations {
        perturbation.validate()?;
    }
    Ok(apply_validated(base, perturbations))
}

impl ScenarioPerturbation {
    /// Applies an already validated set to a copy of `base`
    pub fn apply(&self, base: &StreetGraph) -> ModifiedGraph {
        apply_validated(base, self.as_slice())
    }
}

fn apply_validated(base: &StreetGraph, perturbations: &[Perturbation]) -> ModifiedGraph {
    let mut graph = base.clone();
    let mut summary = PerturbationSummary::default();

    for perturbation in perturbations {
        if let Perturbation::Closure(closure) = perturbation {
            apply_closure(&mut graph, &closure.target, &mut summary);
        }
    }

    for perturbation in perturbations {
        if let Perturbation::CapacityChange {
            selector,
            multiplier,
        } = perturbation
        {
            let matching: Vec<EdgeIndex> = graph
                .edge_references()
                .filter(|edge| selector.matches(edge.weight()))
                .map(|edge| edge.id())
                .collect();
            if matching.is_empty() {
                debug!("Capacity change '{selector}' matched no edges");
            }
            summary.scaled_edges += scale_edges(&mut graph, &matching, multiplier.get());
        }
    }

    for perturbation in perturbations {
        if let Perturbation::ProtectedCorridor { name, multiplier } = perturbation {
            let matching: Vec<EdgeIndex> = graph
                .edge_references()
                .filter(|edge| {
                    let weight = edge.weight();
                    weight
                        .name
                        .as_deref()
                        .is_some_and(|street| street.eq_ignore_ascii_case(name))
                        || weight.has_category(name)
                })
                .map(|edge| edge.id())
                .collect();
            if matching.is_empty() {
                debug!("Protected corridor '{name}' matched no edges");
            }
            summary.protected_edges += scale_edges(&mut graph, &matching, multiplier.get());
        }
    }

    debug!(
        "Perturbed graph: {} nodes and {} edges removed, {} edges rescaled, {} corridor edges",
        summary.removed_nodes, summary.removed_edges, summary.scaled_edges, summary.protected_edges
    );

    ModifiedGraph { graph, summary }
}

fn apply_closure(graph: &mut StreetGraph, target: &ClosureTarget, summary: &mut PerturbationSummary) {
    match target {
        ClosureTarget::Edges { selector } => {
            let matching: Vec<EdgeIndex> = graph
                .edge_references()
                .filter(|edge| selector.matches(edge.weight()))
                .map(|edge| edge.id())
                .collect();
            for edge in matching {
                if graph.remove_edge(edge).is_some() {
                    summary.removed_edges += 1;
                }
            }
        }
        ClosureTarget::Nodes { ids } => {
            let nodes: HashSet<NodeIndex> =
                ids.iter().filter_map(|&id| graph.node_by_osm_id(id)).collect();
            remove_nodes(graph, nodes, summary);
        }
        ClosureTarget::Radius { lon, lat, radius_m } => {
            let center = Point::new(*lon, *lat);
            let nodes: HashSet<NodeIndex> = graph
                .nodes()
                .filter(|(_, node)| haversine_distance(&center, &node.geometry) <= *radius_m)
                .map(|(idx, _)| idx)
                .collect();
            remove_nodes(graph, nodes, summary);
        }
        ClosureTarget::Polygon { .. } => {
            let Some(polygon) = target.polygon() else {
                return;
            };
            let nodes: HashSet<NodeIndex> = graph
                .nodes()
                .filter(|(_, node)| node.geometry.intersects(&polygon))
                .map(|(idx, _)| idx)
                .collect();
            remove_nodes(graph, nodes, summary);
        }
    }
}

fn remove_nodes(graph: &mut StreetGraph, nodes: HashSet<NodeIndex>, summary: &mut PerturbationSummary) {
    for node in nodes {
        let incident = graph.degree(node);
        if graph.remove_node(node).is_some() {
            summary.removed_nodes += 1;
            summary.removed_edges += incident;
        }
    }
}

fn scale_edges(graph: &mut StreetGraph, edges: &[EdgeIndex], multiplier: f64) -> usize {
    let mut scaled = 0;
    for &idx in edges {
        if let Some(edge) = graph.edge_mut(idx) {
            edge.capacity_factor *= multiplier;
            scaled += 1;
        }
    }
    scaled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::StreetEdge, routing::evacuation_route, scenario::EdgeSelector};

    /// A(1) -- B(2) -- C(3), with a bridge between B and C
    fn abc() -> (StreetGraph, [NodeIndex; 3]) {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0).unwrap();
        let b = graph.add_node(2, 0.001, 0.0).unwrap();
        let c = graph.add_node(3, 0.002, 0.0).unwrap();
        graph
            .add_street(a, b, StreetEdge::new(100.0).with_name("Strand"))
            .unwrap();
        graph
            .add_street(
                b,
                c,
                StreetEdge::new(100.0)
                    .with_bridge(true)
                    .with_category("main_road"),
            )
            .unwrap();
        (graph, [a, b, c])
    }

    #[test]
    fn base_graph_is_not_mutated() {
        let (graph, _) = abc();
        let perturbations = vec![
            Perturbation::close_nodes(vec![2]),
            Perturbation::capacity_change("bridge", 0.5).unwrap(),
        ];
        let modified = apply(&graph, &perturbations).unwrap();

        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_count(), 4);
        assert!(graph.edge_references().all(|e| e.weight().capacity_factor == 1.0));
        assert_eq!(modified.node_count(), 2);
        assert_eq!(modified.edge_count(), 0);
        assert_eq!(modified.summary().removed_nodes, 1);
        assert_eq!(modified.summary().removed_edges, 4);
    }

    #[test]
    fn multipliers_compose_on_the_same_edge() {
        let (graph, _) = abc();
        let perturbations = vec![
            Perturbation::capacity_change("is_bridge", 0.5).unwrap(),
            Perturbation::capacity_change("main_road", 2.0).unwrap(),
        ];
        let modified = apply(&graph, &perturbations).unwrap();

        for edge in modified.edge_references() {
            assert!((edge.weight().capacity_factor - 1.0).abs() < 1e-12);
        }
        assert_eq!(modified.summary().scaled_edges, 4);
    }

    #[test]
    fn corridor_applies_after_capacity_changes() {
        let (graph, _) = abc();
        let perturbations = vec![
            Perturbation::protected_corridor("Strand", 3.0).unwrap(),
            Perturbation::capacity_change("name=Strand", 0.5).unwrap(),
        ];
        let modified = apply(&graph, &perturbations).unwrap();

        let strand: Vec<f64> = modified
            .edge_references()
            .filter(|e| e.weight().name.as_deref() == Some("Strand"))
            .map(|e| e.weight().capacity_factor)
            .collect();
        assert_eq!(strand.len(), 2);
        assert!(strand.iter().all(|f| (f - 1.5).abs() < 1e-12));
        assert_eq!(modified.summary().protected_edges, 2);
    }

    #[test]
    fn closing_the_middle_node_disconnects_the_route() {
        let (graph, [a, _, c]) = abc();
        assert!(evacuation_route(&graph, a, c).is_some());

        let modified = apply(&graph, &[Perturbation::close_nodes(vec![2])]).unwrap();
        assert!(evacuation_route(&modified, a, c).is_none());
    }

    #[test]
    fn unmatched_selector_is_a_no_op() {
        let (graph, _) = abc();
        let modified = apply(
            &graph,
            &[Perturbation::capacity_change("highway=motorway", 0.1).unwrap()],
        )
        .unwrap();
        assert_eq!(modified.summary(), PerturbationSummary::default());
        assert!(modified.edge_references().all(|e| e.weight().capacity_factor == 1.0));
    }

    #[test]
    fn edge_closure_removes_matching_edges_only() {
        let (graph, [a, b, c]) = abc();
        let closure = Perturbation::closure(
            ClosureTarget::Edges {
                selector: EdgeSelector::Bridge,
            },
            10,
            20,
        )
        .unwrap();
        let modified = apply(&graph, &[closure]).unwrap();

        assert_eq!(modified.node_count(), 3);
        assert_eq!(modified.edge_count(), 2);
        assert!(evacuation_route(&modified, a, b).is_some());
        assert!(evacuation_route(&modified, a, c).is_none());
    }

    #[test]
    fn area_closures_remove_nodes_inside() {
        let (graph, [a, _, c]) = abc();
        let radius = Perturbation::closure(
            ClosureTarget::Radius {
                lon: 0.001,
                lat: 0.0,
                radius_m: 20.0,
            },
            0,
            60,
        )
        .unwrap();
        let modified = apply(&graph, &[radius]).unwrap();
        assert_eq!(modified.node_count(), 2);
        assert!(evacuation_route(&modified, a, c).is_none());

        let polygon = Perturbation::closure(
            ClosureTarget::Polygon {
                ring: vec![(0.0015, -0.001), (0.0025, -0.001), (0.0025, 0.001), (0.0015, 0.001)],
            },
            0,
            60,
        )
        .unwrap();
        let modified = apply(&graph, &[polygon]).unwrap();
        assert_eq!(modified.node_count(), 2);
        assert!(modified.node_by_osm_id(3).is_none());
    }

    #[test]
    fn invalid_perturbation_is_rejected() {
        let (graph, _) = abc();
        let bad = Perturbation::ProtectedCorridor {
            name: String::new(),
            multiplier: crate::scenario::Multiplier::new(2.0).unwrap(),
        };
        assert!(matches!(
            apply(&graph, &[bad]),
            Err(Error::InvalidPerturbation(_))
        ));
    }
}
