//! Evacuation routing and network metrics over pedestrian street graphs.
//!
//! A scenario perturbs a cached base graph (closures, capacity changes,
//! protected corridors), routes population centers to safe zones with a
//! capacity-aware cost and scores the result.

pub mod algo;
pub mod budget;
pub mod error;
pub mod loading;
pub mod model;
pub mod pipeline;
pub mod prelude;
pub mod routing;
pub mod scenario;

pub use budget::ComputeBudget;
pub use error::Error;

pub use algo::{CapacityModel, CapacityParams, EvacuationMetrics, MetricsCalculator, MetricsParams};
pub use loading::{Config, GraphLoader};
pub use model::{AreaAnchors, OsmNodeId, StreetEdge, StreetGraph};
pub use pipeline::{EvaluationOptions, ScenarioEvaluation, evaluate_scenario};
pub use routing::{Route, RouteCalculator, RoutingParams};
pub use scenario::{Perturbation, Scenario, ScenarioPerturbation};
