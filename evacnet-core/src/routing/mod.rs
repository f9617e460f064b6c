//! Evacuation routing over the street network

mod dijkstra;
pub mod evacuation;
pub mod route;
pub mod to_geojson;

pub use evacuation::{
    RouteCalculator, RouteFailure, RouteSet, RoutingParams, evacuation_route, multi_route,
};
pub use route::{Route, RouteKind};
pub use to_geojson::{routes_to_geojson, routes_to_geojson_string};
