use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use evacnet_core::{Error, pipeline::ScenarioEvaluation};
use serde::Serialize;

use crate::BatchError;

/// Result of one scenario inside a batch
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    Evaluated(ScenarioEvaluation),
    Failed {
        scenario_id: String,
        error: String,
        timed_out: bool,
    },
}

impl ScenarioOutcome {
    pub(crate) fn failed(scenario_id: &str, error: &Error) -> Self {
        ScenarioOutcome::Failed {
            scenario_id: scenario_id.to_string(),
            error: error.to_string(),
            timed_out: matches!(error, Error::BudgetExhausted),
        }
    }

    pub fn scenario_id(&self) -> &str {
        match self {
            ScenarioOutcome::Evaluated(evaluation) => &evaluation.scenario_id,
            ScenarioOutcome::Failed { scenario_id, .. } => scenario_id,
        }
    }

    pub fn evaluation(&self) -> Option<&ScenarioEvaluation> {
        match self {
            ScenarioOutcome::Evaluated(evaluation) => Some(evaluation),
            ScenarioOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScenarioOutcome::Failed { .. })
    }
}

/// Outcomes of a batch, in the order the scenarios were given
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub area: Option<String>,
    pub graph_nodes: usize,
    pub graph_edges: usize,
    pub elapsed_secs: f64,
    pub outcomes: Vec<ScenarioOutcome>,
}

impl BatchReport {
    pub fn get(&self, scenario_id: &str) -> Option<&ScenarioOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.scenario_id() == scenario_id)
    }

    pub fn evaluated(&self) -> impl Iterator<Item = &ScenarioEvaluation> {
        self.outcomes.iter().filter_map(ScenarioOutcome::evaluation)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_failed()).count()
    }

    pub fn to_json(&self) -> Result<String, BatchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), BatchError> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }
}
