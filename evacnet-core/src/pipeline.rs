//! Scenario evaluation: perturb, route, measure

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    ComputeBudget, Error,
    algo::{
        capacity::{CapacityModel, CapacityParams},
        metrics::{DegenerateInput, EvacuationMetrics, MetricsCalculator, MetricsParams},
    },
    loading::Config,
    model::{AreaAnchors, ResolvedAnchors, StreetGraph},
    routing::{Route, RouteCalculator, RoutingParams},
    scenario::{PerturbationSummary, Scenario},
};

/// Parameters shared by every scenario of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    pub capacity: CapacityParams,
    pub routing: RoutingParams,
    pub metrics: MetricsParams,
}

impl EvaluationOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capacity: config.capacity,
            routing: config.routing,
            metrics: config.metrics,
        }
    }
}

/// Result of evaluating one scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioEvaluation {
    pub scenario_id: String,
    pub perturbation: PerturbationSummary,
    pub sources: usize,
    pub destinations: usize,
    pub failed_pairs: usize,
    pub fallback_routes: usize,
    /// Anchors whose street node was closed by the scenario
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unavailable_anchors: Vec<String>,
    pub metrics: EvacuationMetrics,
    #[serde(skip)]
    pub routes: Vec<Route>,
}

/// Evaluates a scenario against a base graph that stays untouched.
///
/// Anchors are snapped on the base graph. An anchor whose node the scenario
/// closes is reported unavailable rather than moved to another street. A
/// scenario that yields no routes still gets a metrics record, marked low
/// confidence.
///
/// # Errors
///
/// Returns [`Error::BudgetExhausted`] or [`Error::Cancelled`] when the budget
/// stops the work
pub fn evaluate_scenario(
    base: &StreetGraph,
    scenario: &Scenario,
    anchors: &AreaAnchors,
    options: &EvaluationOptions,
    budget: &ComputeBudget,
) -> Result<ScenarioEvaluation, Error> {
    budget.check()?;
    let modified = scenario.perturbations.apply(base);
    debug!("Scenario '{}': {:?}", scenario.id, modified.summary());

    let mut resolved = match anchors.resolve(base, Some(options.routing.max_snap_distance)) {
        Ok(resolved) => resolved,
        Err(Error::NoPointsFound) => {
            warn!("Scenario '{}' runs on an empty graph", scenario.id);
            ResolvedAnchors::default()
        }
        Err(e) => return Err(e),
    };
    let unavailable_anchors = resolved.retain_present(&modified);
    if !unavailable_anchors.is_empty() {
        warn!(
            "Scenario '{}' closes the streets of {}",
            scenario.id,
            unavailable_anchors.join(", ")
        );
    }

    let calculator = RouteCalculator::new(&modified)
        .with_model(CapacityModel::new(options.capacity))
        .with_params(options.routing)
        .with_budget(budget.clone());
    let route_set = calculator.multi_route(
        &resolved.source_nodes(),
        &resolved.destination_nodes(),
        options.routing.max_routes,
    )?;

    budget.check()?;
    let mut metrics = MetricsCalculator::new(options.metrics).compute(&modified, &route_set.routes);
    if !unavailable_anchors.is_empty() {
        metrics.note(DegenerateInput::ClosedAnchors);
    }
    if metrics.is_low_confidence() {
        warn!(
            "Scenario '{}' evaluated with low confidence ({} routes)",
            scenario.id,
            route_set.len()
        );
    }

    Ok(ScenarioEvaluation {
        scenario_id: scenario.id.clone(),
        perturbation: modified.summary(),
        sources: resolved.sources.len(),
        destinations: resolved.destinations.len(),
        failed_pairs: route_set.failures.len(),
        fallback_routes: route_set.fallback_count(),
        unavailable_anchors,
        metrics,
        routes: route_set.routes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        algo::metrics::Confidence,
        model::{Anchor, StreetEdge},
        scenario::{ClosureTarget, Perturbation, ScenarioPerturbation},
    };

    /// Two parallel east-west streets joined at both ends
    fn ladder() -> StreetGraph {
        let mut graph = StreetGraph::new();
        let mut prev: Option<(petgraph::graph::NodeIndex, petgraph::graph::NodeIndex)> = None;
        for i in 0..12_i64 {
            let lon = i as f64 * 0.002;
            let north = graph.add_node(i, lon, 0.001).unwrap();
            let south = graph.add_node(100 + i, lon, 0.0).unwrap();
            if let Some((pn, ps)) = prev {
                graph.add_street(pn, north, StreetEdge::new(222.0).with_name("North Road")).unwrap();
                graph.add_street(ps, south, StreetEdge::new(222.0).with_name("South Road")).unwrap();
            }
            if i == 0 || i == 11 {
                graph.add_street(north, south, StreetEdge::new(111.0)).unwrap();
            }
            prev = Some((north, south));
        }
        graph
    }

    fn anchors() -> AreaAnchors {
        AreaAnchors {
            safe_zones: vec![Anchor::new("East park", 0.022, 0.0005)],
            population_centers: vec![
                Anchor::new("West estate", 0.0, 0.001),
                Anchor::new("West market", 0.0, 0.0),
            ],
        }
    }

    #[test]
    fn baseline_scenario_produces_routes_and_metrics() {
        let base = ladder();
        let evaluation = evaluate_scenario(
            &base,
            &Scenario::baseline("baseline"),
            &anchors(),
            &EvaluationOptions::default(),
            &ComputeBudget::unlimited(),
        )
        .unwrap();

        assert_eq!(evaluation.sources, 2);
        assert_eq!(evaluation.destinations, 1);
        assert_eq!(evaluation.routes.len(), 2);
        assert_eq!(evaluation.failed_pairs, 0);
        assert_eq!(evaluation.metrics.routes_evaluated, 2);
        assert_eq!(evaluation.metrics.confidence, Confidence::Normal);
        assert!((0.0..=1.0).contains(&evaluation.metrics.fairness_index()));
        assert!((0.0..=1.0).contains(&evaluation.metrics.robustness()));
    }

    #[test]
    fn isolating_the_safe_zone_gives_low_confidence() {
        let base = ladder();
        let closure = Perturbation::close_nodes(vec![10, 110]);
        let scenario = Scenario::new("cut-off", ScenarioPerturbation::new(vec![closure]).unwrap());
        let options = EvaluationOptions {
            routing: RoutingParams {
                distance_fallback: false,
                ..RoutingParams::default()
            },
            ..EvaluationOptions::default()
        };

        let evaluation =
            evaluate_scenario(&base, &scenario, &anchors(), &options, &ComputeBudget::unlimited())
                .unwrap();

        assert!(evaluation.routes.is_empty());
        assert_eq!(evaluation.failed_pairs, 2);
        assert_eq!(evaluation.perturbation.removed_nodes, 2);
        assert!(evaluation.metrics.is_low_confidence());
        assert_eq!(evaluation.metrics.fairness_index(), 0.5);
        assert_eq!(evaluation.metrics.robustness(), 0.5);
        assert_eq!(base.node_count(), 24);
    }

    #[test]
    fn closing_an_anchor_marks_it_unavailable() {
        let base = ladder();
        let closure = Perturbation::closure(
            ClosureTarget::Radius {
                lon: 0.022,
                lat: 0.0005,
                radius_m: 120.0,
            },
            0,
            u32::MAX,
        )
        .unwrap();
        let scenario = Scenario::new("park-closed", ScenarioPerturbation::new(vec![closure]).unwrap());

        let evaluation = evaluate_scenario(
            &base,
            &scenario,
            &anchors(),
            &EvaluationOptions::default(),
            &ComputeBudget::unlimited(),
        )
        .unwrap();

        assert_eq!(evaluation.perturbation.removed_nodes, 2);
        assert_eq!(evaluation.sources, 2);
        assert_eq!(evaluation.destinations, 0);
        assert_eq!(evaluation.unavailable_anchors, vec!["East park".to_string()]);
        assert!(evaluation.routes.is_empty());
        assert!(evaluation.metrics.is_low_confidence());
        assert!(
            evaluation
                .metrics
                .degenerate
                .contains(&DegenerateInput::ClosedAnchors)
        );

        let json = serde_json::to_value(&evaluation).unwrap();
        assert_eq!(json["unavailable_anchors"][0], "East park");
        assert!(
            json["metrics"]["degenerate"]
                .as_array()
                .unwrap()
                .contains(&serde_json::json!("closed_anchors"))
        );
    }

    #[test]
    fn anchors_beyond_snap_distance_are_ignored() {
        let mut anchors = anchors();
        anchors.safe_zones.push(Anchor::new("Offshore", 0.022, 0.02));
        let options = EvaluationOptions {
            routing: RoutingParams {
                max_snap_distance: 200.0,
                ..RoutingParams::default()
            },
            ..EvaluationOptions::default()
        };

        let evaluation = evaluate_scenario(
            &ladder(),
            &Scenario::baseline("baseline"),
            &anchors,
            &options,
            &ComputeBudget::unlimited(),
        )
        .unwrap();

        assert_eq!(evaluation.destinations, 1);
        assert!(evaluation.unavailable_anchors.is_empty());
        assert_eq!(evaluation.metrics.confidence, Confidence::Normal);
    }

    #[test]
    fn options_take_snap_distance_from_config() {
        let config = Config::from_toml_str("[routing]\nmax_snap_distance = 75.0").unwrap();
        let options = EvaluationOptions::from_config(&config);
        assert!((options.routing.max_snap_distance - 75.0).abs() < 1e-12);
        assert!((RoutingParams::default().max_snap_distance - 500.0).abs() < 1e-12);
    }

    #[test]
    fn cancelled_budget_stops_evaluation() {
        let budget = ComputeBudget::unlimited();
        budget.cancel();
        let result = evaluate_scenario(
            &ladder(),
            &Scenario::baseline("baseline"),
            &anchors(),
            &EvaluationOptions::default(),
            &budget,
        );
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn evaluation_serializes_without_routes() {
        let evaluation = evaluate_scenario(
            &ladder(),
            &Scenario::baseline("baseline"),
            &anchors(),
            &EvaluationOptions::default(),
            &ComputeBudget::unlimited(),
        )
        .unwrap();
        let json = serde_json::to_value(&evaluation).unwrap();
        assert_eq!(json["scenario_id"], "baseline");
        assert!(json.get("routes").is_none());
        assert!(json["metrics"]["graph"]["network_density"].is_number());
    }
}
