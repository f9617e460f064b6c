use std::fmt;

use petgraph::graph::NodeIndex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Street graph unavailable for '{place}' ({} strategies failed)", attempts.len())]
    GraphUnavailable {
        place: String,
        attempts: Vec<StrategyFailure>,
    },
    #[error("No route found from node {} to node {}", from.index(), to.index())]
    NoRouteFound { from: NodeIndex, to: NodeIndex },
    #[error("Invalid perturbation: {0}")]
    InvalidPerturbation(String),
    #[error("No nearby points found for snapping")]
    NoPointsFound,
    #[error("Invalid node index")]
    InvalidNodeIndex,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Cache error: {0}")]
    CacheError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("GeoJSON error: {0}")]
    GeoJsonError(String),
    #[error("Compute budget exhausted")]
    BudgetExhausted,
    #[error("Computation cancelled")]
    Cancelled,
}

impl Error {
    /// Budget and cancellation errors come from the caller's limits, not the data.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Error::BudgetExhausted | Error::Cancelled)
    }
}

/// One step of the graph loading chain
#[derive(Debug, Clone, PartialEq)]
pub enum LoadStrategy {
    DiskCache,
    Query(String),
    BoundingBox,
}

impl fmt::Display for LoadStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadStrategy::DiskCache => write!(f, "disk cache"),
            LoadStrategy::Query(query) => write!(f, "query '{query}'"),
            LoadStrategy::BoundingBox => write!(f, "bounding box"),
        }
    }
}

/// A failed loading attempt, kept so callers can see why an area is unsupported
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    pub strategy: LoadStrategy,
    pub reason: String,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

/// Failures reported by a map data provider
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Geocoding returned no match for '{0}'")]
    NotFound(String),
    #[error("Unexpected provider response: {0}")]
    Parse(String),
    #[error("Provider returned an empty street network")]
    EmptyNetwork,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        Error::NetworkError(err.to_string())
    }
}
