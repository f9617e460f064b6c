//! Capacity model and evacuation metrics

pub mod capacity;
pub mod metrics;

pub use capacity::{CapacityModel, CapacityParams, edge_capacity, evacuation_cost};
pub use metrics::{
    Confidence, DegenerateInput, EvacuationMetrics, GraphMetrics, HeuristicMetrics,
    MetricsCalculator, MetricsParams, Provenance,
};
