use geo::{Coord, LineString};
use geojson::{Feature, FeatureCollection, Geometry, Value as GeoJsonValue};
use serde_json::json;

use super::route::Route;
use crate::{Error, model::StreetGraph};

impl Route {
    /// Converts the route to a `GeoJSON` `LineString` feature.
    pub fn to_feature(&self, graph: &StreetGraph) -> Result<Feature, Error> {
        let coords: Vec<Coord<f64>> = self
            .nodes
            .iter()
            .map(|&idx| {
                graph
                    .node(idx)
                    .map(|node| node.geometry.into())
                    .ok_or(Error::InvalidNodeIndex)
            })
            .collect::<Result<_, _>>()?;

        let geometry = Geometry::new(GeoJsonValue::from(&LineString::new(coords)));
        let osm_ids = self.osm_ids(graph);

        let value = json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": {
                "kind": self.kind,
                "length_meters": self.length_meters,
                "capacity_people_per_minute": self.capacity_people_per_minute,
                "cost_seconds": self.cost_seconds,
                "source_osm_id": osm_ids.first(),
                "destination_osm_id": osm_ids.last(),
                "node_count": self.nodes.len(),
            }
        });

        Feature::from_json_value(value).map_err(|e| Error::GeoJsonError(e.to_string()))
    }
}

/// All routes of a scenario as one `FeatureCollection`
pub fn routes_to_geojson(graph: &StreetGraph, routes: &[Route]) -> Result<FeatureCollection, Error> {
    let features = routes
        .iter()
        .map(|route| route.to_feature(graph))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(FeatureCollection {
        features,
        bbox: None,
        foreign_members: None,
    })
}

pub fn routes_to_geojson_string(graph: &StreetGraph, routes: &[Route]) -> Result<String, Error> {
    serde_json::to_string(&routes_to_geojson(graph, routes)?)
        .map_err(|e| Error::GeoJsonError(e.to_string()))
}
