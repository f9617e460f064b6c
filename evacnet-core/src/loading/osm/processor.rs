use geo::Point;
use hashbrown::HashMap;
use itertools::Itertools;
use log::{debug, info};
use serde::Deserialize;

use crate::{
    error::ProviderError,
    model::{OsmNodeId, StreetEdge, StreetGraph, streets::haversine_distance},
};

/// Highway classes a pedestrian can use
pub(crate) const WALKABLE_HIGHWAYS: &[&str] = &[
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
    "service",
    "track",
    "pedestrian",
    "footway",
    "path",
    "steps",
    "cycleway",
    "bridleway",
];

#[derive(Debug, Deserialize)]
pub struct OverpassResponse {
    pub elements: Vec<OsmElement>,
}

#[derive(Debug, Deserialize)]
pub struct OsmElement {
    #[serde(rename = "type")]
    pub elem_type: String,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub nodes: Option<Vec<OsmNodeId>>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl OsmElement {
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Street category used by scenario selectors
pub(crate) fn highway_category(highway: &str) -> Option<&'static str> {
    let base = highway.strip_suffix("_link").unwrap_or(highway);
    match base {
        "trunk" | "primary" | "secondary" | "tertiary" => Some("main_road"),
        "unclassified" | "residential" | "living_street" | "service" | "track" => {
            Some("local_road")
        }
        "pedestrian" | "footway" | "path" | "steps" | "cycleway" | "bridleway" => {
            Some("footpath")
        }
        _ => None,
    }
}

/// Width in meters from `width`-style tags: "4", "3.5 m", "2,5"
pub(crate) fn parse_width(value: &str) -> Option<f64> {
    let value = value.trim().trim_end_matches('m').trim().replace(',', ".");
    value.parse::<f64>().ok().filter(|w| w.is_finite() && *w > 0.0)
}

/// Gradient in percent from an `incline` tag: "5%", "-10%", "3°".
///
/// Direction-only values ("up", "down") carry no magnitude.
pub(crate) fn parse_incline(value: &str) -> Option<f64> {
    let value = value.trim();
    if let Some(percent) = value.strip_suffix('%') {
        return percent.trim().parse::<f64>().ok().filter(|g| g.is_finite());
    }
    if let Some(degrees) = value.strip_suffix('°') {
        return degrees
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && d.abs() < 90.0)
            .map(|d| d.to_radians().tan() * 100.0);
    }
    value.parse::<f64>().ok().filter(|g| g.is_finite())
}

fn is_walkable(way: &OsmElement) -> bool {
    let Some(highway) = way.tag("highway") else {
        return false;
    };
    if !WALKABLE_HIGHWAYS.contains(&highway) {
        return false;
    }
    !matches!(way.tag("foot"), Some("no" | "private"))
        && !matches!(way.tag("access"), Some("no" | "private"))
}

fn edge_template(way: &OsmElement) -> StreetEdge {
    // placeholder length, replaced per segment
    let mut edge = StreetEdge::new(1.0);
    edge.width = way
        .tag("width")
        .and_then(parse_width)
        .or_else(|| way.tag("est_width").and_then(parse_width));
    edge.gradient = way.tag("incline").and_then(parse_incline);
    edge.bridge = way.tag("bridge").is_some_and(|b| b != "no");
    edge.name = way.tag("name").map(str::to_string);
    if let Some(highway) = way.tag("highway") {
        edge.highway = Some(highway.to_string());
        if let Some(category) = highway_category(highway) {
            edge.categories.push(category.to_string());
        }
    }
    edge
}

/// Builds a walkable street graph from an Overpass `out body` response.
///
/// Every consecutive node pair of a walkable way becomes a two-way street.
/// Segments with unknown or coincident nodes are skipped.
///
/// # Errors
///
/// Returns [`ProviderError::EmptyNetwork`] if no street segment was built
pub fn street_graph_from_overpass(
    response: &OverpassResponse,
) -> Result<StreetGraph, ProviderError> {
    let coords: HashMap<OsmNodeId, (f64, f64)> = response
        .elements
        .iter()
        .filter(|e| e.elem_type == "node")
        .filter_map(|e| Some((e.id, (e.lon?, e.lat?))))
        .collect();
    debug!("Parsed {} OSM nodes", coords.len());

    let mut graph = StreetGraph::new();
    let mut ways = 0_usize;
    let mut skipped = 0_usize;

    for way in response
        .elements
        .iter()
        .filter(|e| e.elem_type == "way" && is_walkable(e))
    {
        let Some(node_ids) = &way.nodes else {
            continue;
        };
        let template = edge_template(way);

        for (from_id, to_id) in node_ids.iter().copied().tuple_windows() {
            let (Some(&(from_lon, from_lat)), Some(&(to_lon, to_lat))) =
                (coords.get(&from_id), coords.get(&to_id))
            else {
                skipped += 1;
                continue;
            };
            let length = haversine_distance(
                &Point::new(from_lon, from_lat),
                &Point::new(to_lon, to_lat),
            );
            if from_id == to_id || length <= 0.0 {
                skipped += 1;
                continue;
            }

            let from = graph
                .add_node(from_id, from_lon, from_lat)
                .map_err(|e| ProviderError::InvalidData(e.to_string()))?;
            let to = graph
                .add_node(to_id, to_lon, to_lat)
                .map_err(|e| ProviderError::InvalidData(e.to_string()))?;
            let mut edge = template.clone();
            edge.length = length;
            graph
                .add_street(from, to, edge)
                .map_err(|e| ProviderError::InvalidData(e.to_string()))?;
        }
        ways += 1;
    }

    if graph.edge_count() == 0 {
        return Err(ProviderError::EmptyNetwork);
    }
    info!(
        "Built street graph with {} nodes and {} edges from {ways} ways ({skipped} segments skipped)",
        graph.node_count(),
        graph.edge_count()
    );
    Ok(graph)
}
