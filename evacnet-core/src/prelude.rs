pub use crate::{ComputeBudget, Error};

// Loading
pub use crate::loading::{BoundingBox, Config, GraphCache, GraphLoader, LoaderConfig};
pub use crate::loading::osm::{MapProvider, OverpassProvider};

// Street network
pub use crate::model::{Anchor, AreaAnchors, OsmNodeId, StreetEdge, StreetGraph};

// Scenarios and routing
pub use crate::pipeline::{EvaluationOptions, ScenarioEvaluation, evaluate_scenario};
pub use crate::routing::{Route, RouteCalculator, RoutingParams, routes_to_geojson};
pub use crate::scenario::{
    ClosureTarget, EdgeSelector, Multiplier, Perturbation, Scenario, ScenarioPerturbation,
};

// Metrics
pub use crate::algo::{
    CapacityModel, CapacityParams, EvacuationMetrics, MetricsCalculator, MetricsParams,
};
