use evacnet_core::GraphLoader;
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

#[derive(Debug, Clone, Default, Serialize)]
pub struct PrewarmReport {
    /// Place and node count of every graph now in the cache
    pub loaded: Vec<(String, usize)>,
    /// Place and error message of every graph that could not be loaded
    pub failed: Vec<(String, String)>,
}

impl PrewarmReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Loads the graphs of common areas ahead of time
pub fn prewarm<S: AsRef<str> + Sync>(loader: &GraphLoader, places: &[S]) -> PrewarmReport {
    let results: Vec<_> = places
        .par_iter()
        .map(|place| {
            let place = place.as_ref();
            (place.to_string(), loader.load_graph(place, false))
        })
        .collect();

    let mut report = PrewarmReport::default();
    for (place, result) in results {
        match result {
            Ok(graph) => report.loaded.push((place, graph.node_count())),
            Err(err) => {
                warn!("Prewarming '{place}' failed: {err}");
                report.failed.push((place, err.to_string()));
            }
        }
    }
    info!("Prewarmed {} of {} areas", report.loaded.len(), places.len());
    report
}
