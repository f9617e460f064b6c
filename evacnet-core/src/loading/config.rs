use std::path::{Path, PathBuf};
use std::time::Duration;

use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    algo::{capacity::CapacityParams, metrics::MetricsParams},
    model::AreaAnchors,
    routing::RoutingParams,
};

/// Engine configuration, usually read from a TOML file.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub loader: LoaderConfig,
    pub capacity: CapacityParams,
    pub routing: RoutingParams,
    pub metrics: MetricsParams,
    pub areas: Vec<AreaConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Directory of the disk cache, no disk cache when absent
    pub cache_dir: Option<PathBuf>,
    /// Disk entries older than this are refetched, hours
    pub cache_max_age_hours: Option<u64>,
    /// Graphs kept in memory
    pub memory_capacity: usize,
    pub nominatim_url: String,
    pub overpass_url: String,
    pub user_agent: String,
    /// Per-request timeout of the map providers, seconds
    pub timeout_secs: u64,
    pub region: RegionConfig,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            cache_max_age_hours: None,
            memory_capacity: 8,
            nominatim_url: "https://nominatim.openstreetmap.org".to_string(),
            overpass_url: "https://overpass-api.de/api/interpreter".to_string(),
            user_agent: concat!("evacnet/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: 180,
            region: RegionConfig::default(),
        }
    }
}

impl LoaderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Region used to qualify place names that are not in the area registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionConfig {
    pub city: String,
    pub country: String,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            city: "London".to_string(),
            country: "UK".to_string(),
        }
    }
}

/// Bounding box in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for non-finite, out-of-range or inverted bounds
    pub fn validate(&self) -> Result<(), Error> {
        let values = [self.min_lon, self.min_lat, self.max_lon, self.max_lat];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::ConfigError(format!("Non-finite bounding box {self:?}")));
        }
        if self.min_lon.abs() > 180.0
            || self.max_lon.abs() > 180.0
            || self.min_lat.abs() > 90.0
            || self.max_lat.abs() > 90.0
        {
            return Err(Error::ConfigError(format!(
                "Bounding box outside WGS84 range: {self:?}"
            )));
        }
        if self.min_lon >= self.max_lon || self.min_lat >= self.max_lat {
            return Err(Error::ConfigError(format!("Empty bounding box {self:?}")));
        }
        Ok(())
    }

    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.min_lon,
                y: self.min_lat,
            },
            Coord {
                x: self.max_lon,
                y: self.max_lat,
            },
        )
    }
}

/// Known area: how to find its street graph and where its anchors are
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    /// Canonical key, also the disk cache file name
    pub key: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Geocoding queries tried in order
    #[serde(default)]
    pub queries: Vec<String>,
    /// Fetched directly when every query fails
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(flatten)]
    pub anchors: AreaAnchors,
}

impl AreaConfig {
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.key.as_str())
            .chain(self.display_name.as_deref())
            .chain(self.aliases.iter().map(String::as_str))
    }

    pub fn name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.key)
    }
}

/// Lowercase with every run of non-alphanumeric characters collapsed to `_`
pub fn normalize_key(place: &str) -> String {
    let mut key = String::with_capacity(place.len());
    for ch in place.trim().chars() {
        if ch.is_alphanumeric() {
            key.extend(ch.to_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}

impl Config {
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the text is not valid TOML for this
    /// structure or fails validation
    pub fn from_toml_str(text: &str) -> Result<Self, Error> {
        let config: Config =
            toml::from_str(text).map_err(|e| Error::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] describing the first invalid value
    pub fn validate(&self) -> Result<(), Error> {
        self.capacity.validate()?;
        self.metrics.validate()?;

        if self.loader.memory_capacity == 0 {
            return Err(Error::ConfigError(
                "loader.memory_capacity must be positive".into(),
            ));
        }
        if !self.routing.min_destination_distance.is_finite()
            || self.routing.min_destination_distance < 0.0
        {
            return Err(Error::ConfigError(format!(
                "routing.min_destination_distance must be non-negative, got {}",
                self.routing.min_destination_distance
            )));
        }
        if !self.routing.max_snap_distance.is_finite() || self.routing.max_snap_distance < 0.0 {
            return Err(Error::ConfigError(format!(
                "routing.max_snap_distance must be non-negative, got {}",
                self.routing.max_snap_distance
            )));
        }

        let mut keys = hashbrown::HashSet::new();
        for area in &self.areas {
            let key = normalize_key(&area.key);
            if key.is_empty() {
                return Err(Error::ConfigError("Area with an empty key".into()));
            }
            if !keys.insert(key) {
                return Err(Error::ConfigError(format!(
                    "Duplicate area key '{}'",
                    area.key
                )));
            }
            if let Some(bbox) = &area.bbox {
                bbox.validate()?;
            }
        }
        Ok(())
    }

    /// Registry entry whose key, display name or alias matches `place`
    pub fn area(&self, place: &str) -> Option<&AreaConfig> {
        let wanted = normalize_key(place);
        if wanted.is_empty() {
            return None;
        }
        self.areas
            .iter()
            .find(|area| area.names().any(|name| normalize_key(name) == wanted))
    }

    /// Cache key of a place: the registry key when known, else the normalized name
    pub fn canonical_key(&self, place: &str) -> String {
        self.area(place)
            .map_or_else(|| normalize_key(place), |area| normalize_key(&area.key))
    }

    /// Geocoding queries for a place, most specific first
    pub fn query_variations(&self, place: &str) -> Vec<String> {
        if let Some(area) = self.area(place) {
            if !area.queries.is_empty() {
                return area.queries.clone();
            }
            return self.region_queries(area.name());
        }
        self.region_queries(place.trim())
    }

    fn region_queries(&self, name: &str) -> Vec<String> {
        let RegionConfig { city, country } = &self.loader.region;
        vec![
            format!("{name}, London Borough of {name}, {city}, {country}"),
            format!("{name}, {city}, {country}"),
            name.to_string(),
        ]
    }

    /// Anchors configured for a place, if it is a known area
    pub fn anchors(&self, place: &str) -> Option<&AreaAnchors> {
        self.area(place).map(|area| &area.anchors)
    }
}
