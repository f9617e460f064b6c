//! Evacuation quality metrics over a graph and its route set.
//!
//! Clearance times and queue length are closed-form approximations over the
//! network shape; fairness and robustness are derived from the graph and the
//! routes. Both groups carry a [`Provenance`] tag so consumers can weigh them
//! differently.

mod fairness;
mod heuristics;
mod robustness;

use log::debug;
use serde::{Deserialize, Serialize};

pub use fairness::fairness_index;
pub use heuristics::{max_queue_length, network_density, route_efficiency};
pub use robustness::robustness;

use crate::{Error, model::StreetGraph, routing::Route};

/// Calibration constants of the metrics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsParams {
    /// Cells per side of the fairness grid
    pub grid_size: usize,
    /// Share of used nodes removed when testing robustness
    pub critical_fraction: f64,
    /// Clearance time of a fully connected network, minutes
    pub base_clearance_minutes: f64,
    pub p95_factor: f64,
    /// People queued per incident street at the busiest node
    pub queue_per_degree: f64,
    /// Value reported for fairness and robustness on degenerate input
    pub neutral: f64,
    /// Graphs smaller than this get a neutral robustness
    pub min_robustness_nodes: usize,
}

impl Default for MetricsParams {
    fn default() -> Self {
        Self {
            grid_size: 10,
            critical_fraction: 0.1,
            base_clearance_minutes: 45.0,
            p95_factor: 2.2,
            queue_per_degree: 50.0,
            neutral: 0.5,
            min_robustness_nodes: 10,
        }
    }
}

impl MetricsParams {
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for out-of-range constants
    pub fn validate(&self) -> Result<(), Error> {
        if self.grid_size == 0 {
            return Err(Error::ConfigError("metrics.grid_size must be positive".into()));
        }
        if !(self.critical_fraction > 0.0 && self.critical_fraction <= 1.0) {
            return Err(Error::ConfigError(format!(
                "metrics.critical_fraction must be in (0, 1], got {}",
                self.critical_fraction
            )));
        }
        if !(0.0..=1.0).contains(&self.neutral) {
            return Err(Error::ConfigError(format!(
                "metrics.neutral must be in [0, 1], got {}",
                self.neutral
            )));
        }
        for (name, value) in [
            ("base_clearance_minutes", self.base_clearance_minutes),
            ("p95_factor", self.p95_factor),
            ("queue_per_degree", self.queue_per_degree),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::ConfigError(format!(
                    "metrics.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Where a group of metric values comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Analytic approximation, not a flow simulation
    Heuristic,
    GraphDerived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Normal,
    /// No routes, or a graph too small to say anything
    Low,
}

/// Input condition that forced a neutral or zero value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegenerateInput {
    NoRoutes,
    TooFewNodes,
    TooFewOccupiedCells,
    NoRouteCoverage,
    TooFewNodesForRobustness,
    /// A closure removed the node an anchor snaps to
    ClosedAnchors,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeuristicMetrics {
    pub provenance: Provenance,
    /// Minutes
    pub clearance_time_p50: f64,
    /// Minutes
    pub clearance_time_p95: f64,
    /// People
    pub max_queue_length: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphMetrics {
    pub provenance: Provenance,
    pub network_density: f64,
    pub route_efficiency: f64,
    pub evacuation_efficiency: f64,
    pub fairness_index: f64,
    pub robustness: f64,
    pub total_nodes: usize,
    pub total_edges: usize,
}

/// Metrics record of one scenario evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvacuationMetrics {
    pub heuristic: HeuristicMetrics,
    pub graph: GraphMetrics,
    pub routes_evaluated: usize,
    pub confidence: Confidence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degenerate: Vec<DegenerateInput>,
}

impl EvacuationMetrics {
    pub fn clearance_time_p50(&self) -> f64 {
        self.heuristic.clearance_time_p50
    }

    pub fn clearance_time_p95(&self) -> f64 {
        self.heuristic.clearance_time_p95
    }

    pub fn max_queue_length(&self) -> f64 {
        self.heuristic.max_queue_length
    }

    pub fn network_density(&self) -> f64 {
        self.graph.network_density
    }

    pub fn route_efficiency(&self) -> f64 {
        self.graph.route_efficiency
    }

    pub fn evacuation_efficiency(&self) -> f64 {
        self.graph.evacuation_efficiency
    }

    pub fn fairness_index(&self) -> f64 {
        self.graph.fairness_index
    }

    pub fn robustness(&self) -> f64 {
        self.graph.robustness
    }

    pub fn is_low_confidence(&self) -> bool {
        self.confidence == Confidence::Low
    }

    /// Records a degenerate input found outside the calculator and drops confidence
    pub(crate) fn note(&mut self, input: DegenerateInput) {
        self.degenerate.push(input);
        self.degenerate.sort_unstable();
        self.degenerate.dedup();
        self.confidence = Confidence::Low;
    }
}

/// Computes [`EvacuationMetrics`] with a fixed set of calibration constants
#[derive(Debug, Clone, Default)]
pub struct MetricsCalculator {
    params: MetricsParams,
}

impl MetricsCalculator {
    pub fn new(params: MetricsParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &MetricsParams {
        &self.params
    }

    /// Never fails: degenerate input yields neutral values and a note.
    pub fn compute(&self, graph: &StreetGraph, routes: &[Route]) -> EvacuationMetrics {
        let params = &self.params;
        let mut degenerate = Vec::new();

        if graph.node_count() < 2 {
            degenerate.push(DegenerateInput::TooFewNodes);
        }
        if routes.is_empty() {
            degenerate.push(DegenerateInput::NoRoutes);
        }

        let density = network_density(graph);
        let clearance_time_p50 = params.base_clearance_minutes * (1.0 + (1.0 - density));
        let heuristic = HeuristicMetrics {
            provenance: Provenance::Heuristic,
            clearance_time_p50,
            clearance_time_p95: clearance_time_p50 * params.p95_factor,
            max_queue_length: max_queue_length(graph, params.queue_per_degree),
        };

        let ((fairness, fairness_note), (robust, robustness_note)) = rayon::join(
            || fairness::fairness_with_note(graph, routes, params),
            || robustness::robustness_with_note(graph, routes, params),
        );
        degenerate.extend(fairness_note);
        degenerate.extend(robustness_note);
        degenerate.sort_unstable();
        degenerate.dedup();

        let graph_metrics = GraphMetrics {
            provenance: Provenance::GraphDerived,
            network_density: density,
            route_efficiency: route_efficiency(graph, routes),
            evacuation_efficiency: evacuation_efficiency(graph, routes),
            fairness_index: fairness,
            robustness: robust,
            total_nodes: graph.node_count(),
            total_edges: graph.edge_count(),
        };

        let confidence = if routes.is_empty() || graph.node_count() < 2 {
            Confidence::Low
        } else {
            Confidence::Normal
        };

        debug!(
            "Metrics over {} routes: density {:.3}, fairness {:.3}, robustness {:.3}",
            routes.len(),
            density,
            fairness,
            robust
        );

        EvacuationMetrics {
            heuristic,
            graph: graph_metrics,
            routes_evaluated: routes.len(),
            confidence,
            degenerate,
        }
    }
}

/// [`MetricsCalculator::compute`] with default constants
pub fn compute(graph: &StreetGraph, routes: &[Route]) -> EvacuationMetrics {
    MetricsCalculator::default().compute(graph, routes)
}

/// Mean directness of the routes, 0 without routes
#[allow(clippy::cast_precision_loss)]
pub fn evacuation_efficiency(graph: &StreetGraph, routes: &[Route]) -> f64 {
    if routes.is_empty() {
        return 0.0;
    }
    routes.iter().map(|route| route.directness(graph)).sum::<f64>() / routes.len() as f64
}
