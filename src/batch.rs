use std::time::{Duration, Instant};

use evacnet_core::{
    AreaAnchors, ComputeBudget, GraphLoader, StreetGraph,
    pipeline::{EvaluationOptions, evaluate_scenario},
    scenario::Scenario,
};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{BatchError, BatchReport, ScenarioOutcome};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchOptions {
    #[serde(flatten)]
    pub evaluation: EvaluationOptions,
    /// Wall-clock limit for each scenario, unlimited when unset
    pub scenario_timeout_secs: Option<u64>,
}

impl BatchOptions {
    pub fn scenario_timeout(&self) -> Option<Duration> {
        self.scenario_timeout_secs.map(Duration::from_secs)
    }
}

/// Evaluates all scenarios in parallel against one base graph.
///
/// A scenario that fails or runs out of time is reported as
/// [`ScenarioOutcome::Failed`]; the others are unaffected.
pub fn evaluate_batch(
    base: &StreetGraph,
    scenarios: &[Scenario],
    anchors: &AreaAnchors,
    options: &BatchOptions,
) -> BatchReport {
    let started = Instant::now();
    info!(
        "Evaluating {} scenarios on {} nodes",
        scenarios.len(),
        base.node_count()
    );

    let outcomes: Vec<ScenarioOutcome> = scenarios
        .par_iter()
        .map(|scenario| {
            let budget = ComputeBudget::from_timeout(options.scenario_timeout());
            match evaluate_scenario(base, scenario, anchors, &options.evaluation, &budget) {
                Ok(evaluation) => ScenarioOutcome::Evaluated(evaluation),
                Err(err) => {
                    warn!("Scenario '{}' failed: {err}", scenario.id);
                    ScenarioOutcome::failed(&scenario.id, &err)
                }
            }
        })
        .collect();

    let report = BatchReport {
        area: None,
        graph_nodes: base.node_count(),
        graph_edges: base.edge_count(),
        elapsed_secs: started.elapsed().as_secs_f64(),
        outcomes,
    };
    info!(
        "Batch finished in {:.2}s: {} evaluated, {} failed",
        report.elapsed_secs,
        report.outcomes.len() - report.failed_count(),
        report.failed_count()
    );
    report
}

/// Loads the street graph of a known area and evaluates the scenarios on it.
///
/// # Errors
///
/// An unavailable graph stops the whole batch, as does an area without
/// configured anchors
pub fn evaluate_area(
    loader: &GraphLoader,
    place: &str,
    scenarios: &[Scenario],
    options: &BatchOptions,
) -> Result<BatchReport, BatchError> {
    let anchors = loader
        .anchors(place)
        .ok_or_else(|| BatchError::MissingAnchors(place.to_string()))?;
    let graph = loader.load_graph(place, false)?;

    let mut report = evaluate_batch(&graph, scenarios, anchors, options);
    report.area = Some(loader.config().canonical_key(place));
    Ok(report)
}
