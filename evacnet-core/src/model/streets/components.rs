//! Street network components - nodes and edges

use geo::Point;
use serde::{Deserialize, Serialize};

/// OSM identifier of a street node
pub type OsmNodeId = i64;

/// Street graph node
#[derive(Debug, Clone, PartialEq)]
pub struct StreetNode {
    /// OSM ID of the node
    pub id: OsmNodeId,
    /// Node coordinates (x = longitude, y = latitude)
    pub geometry: Point<f64>,
}

/// Street graph edge (directed street segment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreetEdge {
    /// Segment length in meters, always positive
    pub length: f64,
    /// Physical width in meters, if the source data has one
    #[serde(default)]
    pub width: Option<f64>,
    /// Incline in percent, if the source data has one
    #[serde(default)]
    pub gradient: Option<f64>,
    /// OSM `highway` class
    #[serde(default)]
    pub highway: Option<String>,
    /// Street name
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bridge: bool,
    /// Free-form categories used by scenario selectors
    #[serde(default)]
    pub categories: Vec<String>,
    /// Scales the pedestrian capacity. 1.0 on unperturbed graphs.
    #[serde(default = "default_capacity_factor")]
    pub capacity_factor: f64,
}

fn default_capacity_factor() -> f64 {
    1.0
}

impl StreetEdge {
    pub fn new(length: f64) -> Self {
        Self {
            length,
            width: None,
            gradient: None,
            highway: None,
            name: None,
            bridge: false,
            categories: Vec::new(),
            capacity_factor: 1.0,
        }
    }

    #[must_use]
    pub fn with_width(mut self, width: f64) -> Self {
        self.width = Some(width);
        self
    }

    #[must_use]
    pub fn with_gradient(mut self, gradient: f64) -> Self {
        self.gradient = Some(gradient);
        self
    }

    #[must_use]
    pub fn with_highway(mut self, highway: impl Into<String>) -> Self {
        self.highway = Some(highway.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_bridge(mut self, bridge: bool) -> Self {
        self.bridge = bridge;
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.categories.push(category.into());
        self
    }

    /// Case-insensitive category lookup
    pub fn has_category(&self, category: &str) -> bool {
        self.categories
            .iter()
            .any(|c| c.eq_ignore_ascii_case(category))
    }
}
