//! Data model for evacuation routing
//!
//! Contains the street network and the curated anchors routes start and end at.

pub mod anchors;
pub mod streets;

pub use anchors::{Anchor, AnchorKind, AreaAnchors, ResolvedAnchor, ResolvedAnchors};
pub use streets::{OsmNodeId, StreetEdge, StreetGraph, StreetNode};
