use log::{debug, info};
use reqwest::blocking::Client;
use serde::Deserialize;

use super::processor::{OverpassResponse, WALKABLE_HIGHWAYS, street_graph_from_overpass};
use crate::{
    Error,
    error::ProviderError,
    loading::{BoundingBox, LoaderConfig},
    model::StreetGraph,
};

/// Source of street networks for the graph loader
pub trait MapProvider: Send + Sync {
    /// Bounding box of the best match for a free-text place query
    fn geocode(&self, query: &str) -> Result<BoundingBox, ProviderError>;

    /// Walkable street network inside a bounding box
    fn fetch_bbox(&self, bbox: &BoundingBox) -> Result<StreetGraph, ProviderError>;

    fn fetch_place(&self, query: &str) -> Result<StreetGraph, ProviderError> {
        let bbox = self.geocode(query)?;
        self.fetch_bbox(&bbox)
    }
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    /// `[south, north, west, east]` as strings
    boundingbox: [String; 4],
    #[serde(default)]
    display_name: String,
}

impl NominatimPlace {
    fn bbox(&self) -> Result<BoundingBox, ProviderError> {
        let parse = |value: &str| {
            value
                .parse::<f64>()
                .map_err(|e| ProviderError::Parse(format!("bounding box value '{value}': {e}")))
        };
        let [south, north, west, east] = &self.boundingbox;
        Ok(BoundingBox::new(
            parse(west)?,
            parse(south)?,
            parse(east)?,
            parse(north)?,
        ))
    }
}

/// Nominatim geocoding plus Overpass street download over blocking HTTP
#[derive(Debug, Clone)]
pub struct OverpassProvider {
    client: Client,
    nominatim_url: String,
    overpass_url: String,
    timeout_secs: u64,
}

impl OverpassProvider {
    /// # Errors
    ///
    /// Returns [`Error::NetworkError`] if the HTTP client cannot be built
    pub fn new(config: &LoaderConfig) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::NetworkError(e.to_string()))?;
        Ok(Self {
            client,
            nominatim_url: config.nominatim_url.trim_end_matches('/').to_string(),
            overpass_url: config.overpass_url.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    fn overpass_query(&self, bbox: &BoundingBox) -> String {
        format!(
            "[out:json][timeout:{}];\n(\n  way[\"highway\"~\"^({})$\"]({},{},{},{});\n);\n(._;>;);\nout body;",
            self.timeout_secs,
            WALKABLE_HIGHWAYS.join("|"),
            bbox.min_lat,
            bbox.min_lon,
            bbox.max_lat,
            bbox.max_lon
        )
    }
}

impl MapProvider for OverpassProvider {
    fn geocode(&self, query: &str) -> Result<BoundingBox, ProviderError> {
        let places: Vec<NominatimPlace> = self
            .client
            .get(format!("{}/search", self.nominatim_url))
            .query(&[("q", query), ("format", "json"), ("limit", "1")])
            .send()?
            .error_for_status()?
            .json()?;

        let place = places
            .first()
            .ok_or_else(|| ProviderError::NotFound(query.to_string()))?;
        let bbox = place.bbox()?;
        bbox.validate()
            .map_err(|e| ProviderError::InvalidData(e.to_string()))?;
        debug!("Geocoded '{query}' to '{}': {bbox:?}", place.display_name);
        Ok(bbox)
    }

    fn fetch_bbox(&self, bbox: &BoundingBox) -> Result<StreetGraph, ProviderError> {
        info!(
            "Downloading street network for {:.4},{:.4} to {:.4},{:.4}",
            bbox.min_lat, bbox.min_lon, bbox.max_lat, bbox.max_lon
        );
        let response: OverpassResponse = self
            .client
            .post(&self.overpass_url)
            .header("Content-Type", "text/plain")
            .body(self.overpass_query(bbox))
            .send()?
            .error_for_status()?
            .json()?;
        debug!("Downloaded {} OSM elements", response.elements.len());

        street_graph_from_overpass(&response)
    }
}
