use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Core(#[from] evacnet_core::Error),
    #[error("No safe zones or population centers configured for '{0}'")]
    MissingAnchors(String),
    #[error("Report serialization failed: {0}")]
    Report(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
