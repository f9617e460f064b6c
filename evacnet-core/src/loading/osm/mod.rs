//! OpenStreetMap street networks over the Nominatim and Overpass APIs

mod processor;
mod provider;

pub use processor::{OsmElement, OverpassResponse, street_graph_from_overpass};
pub use provider::{MapProvider, OverpassProvider};
