//! Evacuation-optimal routing between population sources and safe zones

use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::dijkstra::dijkstra_path;
use super::route::{Route, RouteKind};
use crate::{ComputeBudget, Error, algo::capacity::CapacityModel, model::StreetGraph};

/// Tunables of the route calculator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingParams {
    /// Safe zones closer than this to a source (meters) are not used as its destination
    pub min_destination_distance: f64,
    /// Fall back to the shortest path by distance when the evacuation search fails
    pub distance_fallback: bool,
    /// Upper bound on routes per scenario
    pub max_routes: usize,
    /// Anchors further than this from the base network are ignored, meters
    pub max_snap_distance: f64,
}

impl Default for RoutingParams {
    fn default() -> Self {
        Self {
            min_destination_distance: 500.0,
            distance_fallback: true,
            max_routes: 20,
            max_snap_distance: 500.0,
        }
    }
}

/// A source/destination pair that produced no route
#[derive(Debug)]
pub struct RouteFailure {
    pub source: NodeIndex,
    pub destination: NodeIndex,
    pub error: Error,
}

/// Outcome of a multi-route computation
#[derive(Debug, Default)]
pub struct RouteSet {
    pub routes: Vec<Route>,
    pub failures: Vec<RouteFailure>,
}

impl RouteSet {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn fallback_count(&self) -> usize {
        self.routes
            .iter()
            .filter(|route| route.kind == RouteKind::DistanceFallback)
            .count()
    }
}

/// Computes routes on one graph with a fixed capacity model and budget
#[derive(Debug, Clone)]
pub struct RouteCalculator<'a> {
    graph: &'a StreetGraph,
    model: CapacityModel,
    params: RoutingParams,
    budget: ComputeBudget,
}

impl<'a> RouteCalculator<'a> {
    pub fn new(graph: &'a StreetGraph) -> Self {
        Self {
            graph,
            model: CapacityModel::default(),
            params: RoutingParams::default(),
            budget: ComputeBudget::unlimited(),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: CapacityModel) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub fn with_params(mut self, params: RoutingParams) -> Self {
        self.params = params;
        self
    }

    #[must_use]
    pub fn with_budget(mut self, budget: ComputeBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn graph(&self) -> &'a StreetGraph {
        self.graph
    }

    pub fn model(&self) -> &CapacityModel {
        &self.model
    }

    /// Cheapest route under the evacuation cost, `None` when disconnected
    ///
    /// # Errors
    ///
    /// Returns an error for unknown nodes or when the budget runs out
    pub fn evacuation_route(
        &self,
        source: NodeIndex,
        destination: NodeIndex,
    ) -> Result<Option<Route>, Error> {
        let model = self.model;
        let path = dijkstra_path(
            self.graph,
            source,
            destination,
            |edge| model.evacuation_cost(edge),
            &self.budget,
        )?;
        Ok(path.map(|path| Route::from_search(self.graph, &model, path, RouteKind::Evacuation)))
    }

    /// Shortest route by distance, `None` when disconnected
    ///
    /// # Errors
    ///
    /// Returns an error for unknown nodes or when the budget runs out
    pub fn shortest_route(
        &self,
        source: NodeIndex,
        destination: NodeIndex,
    ) -> Result<Option<Route>, Error> {
        let path = dijkstra_path(
            self.graph,
            source,
            destination,
            |edge| edge.length,
            &self.budget,
        )?;
        Ok(path.map(|path| {
            Route::from_search(self.graph, &self.model, path, RouteKind::DistanceFallback)
        }))
    }

    /// Evacuation route, degraded to the distance route if allowed and needed
    ///
    /// # Errors
    ///
    /// See [`RouteCalculator::evacuation_route`]
    pub fn route(&self, source: NodeIndex, destination: NodeIndex) -> Result<Option<Route>, Error> {
        if let Some(route) = self.evacuation_route(source, destination)? {
            return Ok(Some(route));
        }
        if !self.params.distance_fallback {
            return Ok(None);
        }

        let fallback = self.shortest_route(source, destination)?;
        if fallback.is_some() {
            log::debug!(
                "Using distance fallback from node {} to node {}",
                source.index(),
                destination.index()
            );
        }
        Ok(fallback)
    }

    /// Pairs every source with one destination, at most `max_routes` pairs.
    ///
    /// Destinations closer than the minimum distance are excluded. Among the
    /// rest the least used one wins, ties going round-robin from the source's
    /// position so that sources spread over the safe zones.
    pub fn assign_pairs(
        &self,
        sources: &[NodeIndex],
        destinations: &[NodeIndex],
        max_routes: usize,
    ) -> Vec<(NodeIndex, NodeIndex)> {
        let mut usage = vec![0usize; destinations.len()];
        let mut pairs = Vec::with_capacity(max_routes.min(sources.len()));
        if destinations.is_empty() {
            return pairs;
        }

        for (position, &source) in sources.iter().enumerate() {
            if pairs.len() >= max_routes {
                break;
            }

            let choice = (0..destinations.len())
                .map(|offset| (position + offset) % destinations.len())
                .filter(|&candidate| {
                    self.graph
                        .node_distance(source, destinations[candidate])
                        .is_some_and(|distance| distance >= self.params.min_destination_distance)
                })
                .min_by_key(|&candidate| usage[candidate]);

            match choice {
                Some(candidate) => {
                    usage[candidate] += 1;
                    pairs.push((source, destinations[candidate]));
                }
                None => log::debug!(
                    "No safe zone far enough from source node {}",
                    source.index()
                ),
            }
        }

        pairs
    }

    /// Routes for up to `max_routes` diverse source/destination pairs.
    ///
    /// Pairs without a route are reported in [`RouteSet::failures`] and do not
    /// stop the others.
    ///
    /// # Errors
    ///
    /// Only budget exhaustion or cancellation aborts the batch
    pub fn multi_route(
        &self,
        sources: &[NodeIndex],
        destinations: &[NodeIndex],
        max_routes: usize,
    ) -> Result<RouteSet, Error> {
        let pairs = self.assign_pairs(sources, destinations, max_routes);

        let results: Vec<_> = pairs
            .par_iter()
            .map(|&(source, destination)| (source, destination, self.route(source, destination)))
            .collect();

        let mut set = RouteSet::default();
        for (source, destination, result) in results {
            match result {
                Ok(Some(route)) => set.routes.push(route),
                Ok(None) => set.failures.push(RouteFailure {
                    source,
                    destination,
                    error: Error::NoRouteFound {
                        from: source,
                        to: destination,
                    },
                }),
                Err(err) if err.is_interrupted() => return Err(err),
                Err(error) => set.failures.push(RouteFailure {
                    source,
                    destination,
                    error,
                }),
            }
        }

        if !set.failures.is_empty() {
            log::debug!(
                "{} of {} routes could not be computed",
                set.failures.len(),
                pairs.len()
            );
        }
        Ok(set)
    }
}

/// Evacuation route with the default capacity model
pub fn evacuation_route(
    graph: &StreetGraph,
    source: NodeIndex,
    destination: NodeIndex,
) -> Option<Route> {
    RouteCalculator::new(graph)
        .evacuation_route(source, destination)
        .ok()
        .flatten()
}

/// Evacuation routes for diverse source/destination pairs with default settings
pub fn multi_route(
    graph: &StreetGraph,
    sources: &[NodeIndex],
    destinations: &[NodeIndex],
    max_routes: usize,
) -> Vec<Route> {
    RouteCalculator::new(graph)
        .multi_route(sources, destinations, max_routes)
        .map(|set| set.routes)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StreetEdge;
    use petgraph::visit::EdgeRef;

    /// Two parallel corridors between west and east: a short narrow alley and
    /// a longer wide avenue
    fn corridors() -> (StreetGraph, NodeIndex, NodeIndex, NodeIndex, NodeIndex) {
        let mut graph = StreetGraph::new();
        let west = graph.add_node(1, -0.010, 51.5).unwrap();
        let alley = graph.add_node(2, -0.005, 51.5).unwrap();
        let avenue = graph.add_node(3, -0.005, 51.501).unwrap();
        let east = graph.add_node(4, 0.000, 51.5).unwrap();
        let narrow = StreetEdge::new(350.0).with_width(1.0);
        let wide = StreetEdge::new(380.0).with_width(12.0);
        graph.add_street(west, alley, narrow.clone()).unwrap();
        graph.add_street(alley, east, narrow).unwrap();
        graph.add_street(west, avenue, wide.clone()).unwrap();
        graph.add_street(avenue, east, wide).unwrap();
        (graph, west, alley, avenue, east)
    }

    #[test]
    fn evacuation_cost_prefers_wide_streets() {
        let (graph, west, alley, avenue, east) = corridors();
        let calculator = RouteCalculator::new(&graph);

        let evacuation = calculator.evacuation_route(west, east).unwrap().unwrap();
        assert_eq!(evacuation.nodes, vec![west, avenue, east]);
        assert_eq!(evacuation.kind, RouteKind::Evacuation);

        let shortest = calculator.shortest_route(west, east).unwrap().unwrap();
        assert_eq!(shortest.nodes, vec![west, alley, east]);
    }

    #[test]
    fn route_edges_connect_consecutive_nodes() {
        let (graph, west, _, _, east) = corridors();
        let route = evacuation_route(&graph, west, east).unwrap();
        let mut length = 0.0;
        for (pair, &edge) in route.nodes.windows(2).zip(&route.edges) {
            let (from, to) = graph.edge_endpoints(edge).unwrap();
            assert_eq!((from, to), (pair[0], pair[1]));
            length += graph.edge(edge).unwrap().length;
        }
        assert!((route.length_meters - length).abs() < 1e-9);
    }

    #[test]
    fn disconnected_graph_returns_none() {
        let (mut graph, west, ..) = corridors();
        let island = graph.add_node(9, 1.0, 51.0).unwrap();
        assert!(evacuation_route(&graph, west, island).is_none());

        let set = RouteCalculator::new(&graph)
            .multi_route(&[west], &[island], 5)
            .unwrap();
        assert!(set.is_empty());
        assert!(matches!(
            set.failures[0].error,
            Error::NoRouteFound { .. }
        ));
    }

    #[test]
    fn fallback_is_used_when_evacuation_search_finds_nothing() {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(1, 0.0, 0.0).unwrap();
        let b = graph.add_node(2, 0.01, 0.0).unwrap();
        graph.add_street(a, b, StreetEdge::new(1100.0)).unwrap();

        // A model whose costs overflow to infinity makes every edge impassable
        // for the evacuation search while lengths stay usable.
        let params = crate::algo::capacity::CapacityParams {
            base_walking_speed: f64::MIN_POSITIVE,
            min_walking_speed: f64::MIN_POSITIVE,
            ..Default::default()
        };
        let calculator = RouteCalculator::new(&graph).with_model(CapacityModel::new(params));
        assert!(calculator.evacuation_route(a, b).unwrap().is_none());

        let route = calculator.route(a, b).unwrap().unwrap();
        assert_eq!(route.kind, RouteKind::DistanceFallback);

        let strict = calculator.with_params(RoutingParams {
            distance_fallback: false,
            ..RoutingParams::default()
        });
        assert!(strict.route(a, b).unwrap().is_none());
    }

    #[test]
    fn assignment_skips_close_destinations_and_spreads_load() {
        let mut graph = StreetGraph::new();
        let sources: Vec<_> = (0..4)
            .map(|i| graph.add_node(i, 0.0, f64::from(i as i32) * 0.0001).unwrap())
            .collect();
        let near = graph.add_node(10, 0.0001, 0.0).unwrap();
        let far_a = graph.add_node(11, 0.02, 0.0).unwrap();
        let far_b = graph.add_node(12, -0.02, 0.0).unwrap();

        let calculator = RouteCalculator::new(&graph);
        let pairs = calculator.assign_pairs(&sources, &[near, far_a, far_b], 10);
        assert_eq!(pairs.len(), 4);
        assert!(pairs.iter().all(|&(_, d)| d != near));
        let to_a = pairs.iter().filter(|&&(_, d)| d == far_a).count();
        assert_eq!(to_a, 2);

        let capped = calculator.assign_pairs(&sources, &[far_a, far_b], 3);
        assert_eq!(capped.len(), 3);
    }

    #[test]
    fn multi_route_on_grid() {
        let mut graph = StreetGraph::new();
        let mut ids = Vec::new();
        for row in 0..5 {
            for col in 0..5 {
                let id = row * 5 + col;
                ids.push(
                    graph
                        .add_node(id, f64::from(col as i32) * 0.004, f64::from(row as i32) * 0.004)
                        .unwrap(),
                );
            }
        }
        for row in 0..5 {
            for col in 0..5 {
                let here = ids[row * 5 + col];
                if col + 1 < 5 {
                    graph
                        .add_street(here, ids[row * 5 + col + 1], StreetEdge::new(445.0))
                        .unwrap();
                }
                if row + 1 < 5 {
                    graph
                        .add_street(here, ids[(row + 1) * 5 + col], StreetEdge::new(445.0))
                        .unwrap();
                }
            }
        }

        let sources = vec![ids[0], ids[1], ids[5]];
        let destinations = vec![ids[24], ids[20], ids[4]];
        let routes = multi_route(&graph, &sources, &destinations, 10);
        assert_eq!(routes.len(), 3);
        for route in &routes {
            assert!(sources.contains(&route.source().unwrap()));
            assert!(destinations.contains(&route.destination().unwrap()));
            for &edge in &route.edges {
                assert!(graph.edge_references().any(|e| e.id() == edge));
            }
        }
    }
}
