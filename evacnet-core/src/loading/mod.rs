//! This module is responsible for turning place names into street graphs:
//! configuration, the map provider, the graph cache and the loader tying
//! them together.

mod builder;
pub mod cache;
mod config;
pub mod osm;

pub use builder::GraphLoader;
pub use cache::{CacheStore, DiskStore, GraphCache, MemoryStore};
pub use config::{AreaConfig, BoundingBox, Config, LoaderConfig, RegionConfig, normalize_key};
