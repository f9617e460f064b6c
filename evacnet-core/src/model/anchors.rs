//! Safe zones and population centers, snapped to the street network

use geo::Point;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::{Error, model::StreetGraph};

/// Named coordinate used as a route endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
}

impl Anchor {
    pub fn new(name: impl Into<String>, lon: f64, lat: f64) -> Self {
        Self {
            name: name.into(),
            lon,
            lat,
        }
    }

    pub fn point(&self) -> Point<f64> {
        Point::new(self.lon, self.lat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorKind {
    SafeZone,
    PopulationCenter,
}

/// Curated anchors of one area
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaAnchors {
    #[serde(default)]
    pub safe_zones: Vec<Anchor>,
    #[serde(default)]
    pub population_centers: Vec<Anchor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAnchor {
    pub name: String,
    pub kind: AnchorKind,
    pub node: NodeIndex,
    /// Distance from the anchor to its node in meters
    pub snap_distance: f64,
}

/// Anchors mapped onto a specific graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedAnchors {
    pub sources: Vec<ResolvedAnchor>,
    pub destinations: Vec<ResolvedAnchor>,
}

impl ResolvedAnchors {
    pub fn source_nodes(&self) -> Vec<NodeIndex> {
        self.sources.iter().map(|anchor| anchor.node).collect()
    }

    pub fn destination_nodes(&self) -> Vec<NodeIndex> {
        self.destinations.iter().map(|anchor| anchor.node).collect()
    }

    /// Drops anchors whose node is missing from `graph` and returns their names.
    ///
    /// Node indices survive removals in a [`StreetGraph`], so anchors resolved on
    /// a base graph can be checked against any perturbed copy of it.
    pub fn retain_present(&mut self, graph: &StreetGraph) -> Vec<String> {
        let mut missing = Vec::new();
        for anchors in [&mut self.sources, &mut self.destinations] {
            anchors.retain(|anchor| {
                let present = graph.contains_node(anchor.node);
                if !present {
                    missing.push(anchor.name.clone());
                }
                present
            });
        }
        missing
    }
}

impl AreaAnchors {
    /// Snap every anchor to its nearest node.
    ///
    /// Anchors further than `max_snap_distance` meters from the network are
    /// left out.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoPointsFound`] if the graph has no nodes
    pub fn resolve(
        &self,
        graph: &StreetGraph,
        max_snap_distance: Option<f64>,
    ) -> Result<ResolvedAnchors, Error> {
        if graph.is_empty() {
            return Err(Error::NoPointsFound);
        }

        let snap = |anchors: &[Anchor], kind: AnchorKind| -> Vec<ResolvedAnchor> {
            anchors
                .iter()
                .filter_map(|anchor| {
                    let (node, snap_distance) = graph.nearest_node(&anchor.point())?;
                    if max_snap_distance.is_some_and(|max| snap_distance > max) {
                        log::warn!(
                            "{} is {snap_distance:.0}m from the nearest street - skipping",
                            anchor.name
                        );
                        return None;
                    }
                    Some(ResolvedAnchor {
                        name: anchor.name.clone(),
                        kind,
                        node,
                        snap_distance,
                    })
                })
                .collect()
        };

        Ok(ResolvedAnchors {
            sources: snap(&self.population_centers, AnchorKind::PopulationCenter),
            destinations: snap(&self.safe_zones, AnchorKind::SafeZone),
        })
    }
}
