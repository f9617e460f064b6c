//! Pedestrian street network model

pub mod components;
pub mod network;

pub use components::{OsmNodeId, StreetEdge, StreetNode};
pub use network::{IndexedPoint, StreetGraph, haversine_distance};
