//! Street graph with a spatial index over its nodes

use geo::{BoundingRect, Distance, Haversine, MultiPoint, Point, Rect};
use hashbrown::HashMap;
use petgraph::{
    Direction,
    graph::{EdgeIndex, NodeIndex},
    stable_graph::{EdgeReference, StableDiGraph},
    unionfind::UnionFind,
    visit::{EdgeRef, IntoEdgeReferences},
};
use rstar::{RTree, primitives::GeomWithData};

use super::components::{OsmNodeId, StreetEdge, StreetNode};
use crate::Error;

/// Point in the spatial index carrying its graph node
pub type IndexedPoint = GeomWithData<Point<f64>, NodeIndex>;

/// Directed street multigraph.
///
/// Node and edge indices stay valid when other nodes or edges are removed,
/// so a perturbed copy can be addressed with indices of the base graph.
#[derive(Debug, Clone, Default)]
pub struct StreetGraph {
    pub(crate) graph: StableDiGraph<StreetNode, StreetEdge>,
    rtree: RTree<IndexedPoint>,
    osm_index: HashMap<OsmNodeId, NodeIndex>,
}

impl StreetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, returning the existing index if the OSM id is already present
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinates are not valid WGS84
    pub fn add_node(&mut self, id: OsmNodeId, lon: f64, lat: f64) -> Result<NodeIndex, Error> {
        if !lon.is_finite() || !lat.is_finite() || lon.abs() > 180.0 || lat.abs() > 90.0 {
            return Err(Error::InvalidData(format!(
                "Invalid coordinates for node {id}: ({lon}, {lat})"
            )));
        }
        if let Some(&existing) = self.osm_index.get(&id) {
            return Ok(existing);
        }

        let geometry = Point::new(lon, lat);
        let idx = self.graph.add_node(StreetNode { id, geometry });
        self.rtree.insert(IndexedPoint::new(geometry, idx));
        self.osm_index.insert(id, idx);
        Ok(idx)
    }

    /// Adds a directed edge
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint does not exist or the length is not positive
    pub fn add_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: StreetEdge,
    ) -> Result<EdgeIndex, Error> {
        if !self.graph.contains_node(from) || !self.graph.contains_node(to) {
            return Err(Error::InvalidNodeIndex);
        }
        if !edge.length.is_finite() || edge.length <= 0.0 {
            return Err(Error::InvalidData(format!(
                "Edge length must be positive, got {}",
                edge.length
            )));
        }
        Ok(self.graph.add_edge(from, to, edge))
    }

    /// Adds a two-way street as a pair of directed edges
    ///
    /// # Errors
    ///
    /// See [`StreetGraph::add_edge`]
    pub fn add_street(
        &mut self,
        a: NodeIndex,
        b: NodeIndex,
        edge: StreetEdge,
    ) -> Result<(EdgeIndex, EdgeIndex), Error> {
        let forward = self.add_edge(a, b, edge.clone())?;
        let backward = self.add_edge(b, a, edge)?;
        Ok((forward, backward))
    }

    /// Removes a node together with all incident edges
    pub fn remove_node(&mut self, idx: NodeIndex) -> Option<StreetNode> {
        let node = self.graph.remove_node(idx)?;
        self.rtree.remove(&IndexedPoint::new(node.geometry, idx));
        self.osm_index.remove(&node.id);
        Some(node)
    }

    pub fn remove_edge(&mut self, idx: EdgeIndex) -> Option<StreetEdge> {
        self.graph.remove_edge(idx)
    }

    pub fn node(&self, idx: NodeIndex) -> Option<&StreetNode> {
        self.graph.node_weight(idx)
    }

    pub fn edge(&self, idx: EdgeIndex) -> Option<&StreetEdge> {
        self.graph.edge_weight(idx)
    }

    pub(crate) fn edge_mut(&mut self, idx: EdgeIndex) -> Option<&mut StreetEdge> {
        self.graph.edge_weight_mut(idx)
    }

    pub fn edge_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    pub fn node_by_osm_id(&self, id: OsmNodeId) -> Option<NodeIndex> {
        self.osm_index.get(&id).copied()
    }

    pub fn contains_node(&self, idx: NodeIndex) -> bool {
        self.graph.contains_node(idx)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Upper bound of node indices, for index-addressed buffers
    pub fn node_bound(&self) -> usize {
        self.graph.node_indices().map(|n| n.index() + 1).max().unwrap_or(0)
    }

    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn edge_indices(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeIndex, &StreetNode)> + '_ {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph.node_weight(idx).map(|node| (idx, node)))
    }

    /// Outgoing edges of a node
    pub fn edges(&self, node: NodeIndex) -> impl Iterator<Item = EdgeReference<'_, StreetEdge>> {
        self.graph.edges(node)
    }

    pub fn edge_references(&self) -> impl Iterator<Item = EdgeReference<'_, StreetEdge>> {
        self.graph.edge_references()
    }

    /// Edges running from `from` to `to` (several for parallel segments)
    pub fn edges_between(
        &self,
        from: NodeIndex,
        to: NodeIndex,
    ) -> impl Iterator<Item = EdgeReference<'_, StreetEdge>> {
        self.graph.edges(from).filter(move |edge| edge.target() == to)
    }

    /// In-degree plus out-degree
    pub fn degree(&self, node: NodeIndex) -> usize {
        self.graph.edges_directed(node, Direction::Outgoing).count()
            + self.graph.edges_directed(node, Direction::Incoming).count()
    }

    /// Nearest node to a point and the haversine distance to it in meters
    pub fn nearest_node(&self, point: &Point<f64>) -> Option<(NodeIndex, f64)> {
        self.rtree.nearest_neighbor(point).map(|nearest| {
            let distance = haversine_distance(nearest.geom(), point);
            (nearest.data, distance)
        })
    }

    /// Haversine distance between two nodes in meters
    pub fn node_distance(&self, a: NodeIndex, b: NodeIndex) -> Option<f64> {
        let a = self.graph.node_weight(a)?;
        let b = self.graph.node_weight(b)?;
        Some(haversine_distance(&a.geometry, &b.geometry))
    }

    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        let points: MultiPoint = self.nodes().map(|(_, node)| node.geometry).collect();
        points.bounding_rect()
    }

    /// Number of weakly connected components, isolated nodes included
    pub fn weakly_connected_components(&self) -> usize {
        let bound = self.node_bound();
        let mut components = UnionFind::<usize>::new(bound);
        for edge in self.graph.edge_references() {
            components.union(edge.source().index(), edge.target().index());
        }

        let mut roots: Vec<usize> = self
            .graph
            .node_indices()
            .map(|node| components.find(node.index()))
            .collect();
        roots.sort_unstable();
        roots.dedup();
        roots.len()
    }
}

/// Great-circle distance in meters
pub fn haversine_distance(a: &Point<f64>, b: &Point<f64>) -> f64 {
    Haversine.distance(*a, *b)
}
