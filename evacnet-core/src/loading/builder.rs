use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use super::cache::{DiskStore, GraphCache};
use super::config::Config;
use super::osm::{MapProvider, OverpassProvider};
use crate::{
    Error,
    error::{LoadStrategy, ProviderError, StrategyFailure},
    model::{AreaAnchors, StreetGraph},
};

/// Resolves place names to street graphs through the cache and map provider.
///
/// Concurrent requests for the same key share one load; different keys load
/// in parallel.
pub struct GraphLoader {
    config: Config,
    provider: Box<dyn MapProvider>,
    cache: Arc<GraphCache>,
}

impl std::fmt::Debug for GraphLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphLoader")
            .field("areas", &self.config.areas.len())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl GraphLoader {
    pub fn new(
        config: Config,
        provider: impl MapProvider + 'static,
        cache: Arc<GraphCache>,
    ) -> Self {
        Self {
            config,
            provider: Box::new(provider),
            cache,
        }
    }

    /// Loader over Nominatim and Overpass, with a disk cache when
    /// `loader.cache_dir` is set
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built
    pub fn from_config(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let provider = OverpassProvider::new(&config.loader)?;
        let mut cache = GraphCache::new(config.loader.memory_capacity);
        if let Some(dir) = &config.loader.cache_dir {
            let mut store = DiskStore::new(dir);
            if let Some(hours) = config.loader.cache_max_age_hours {
                store = store.with_max_age(Duration::from_secs(hours.saturating_mul(3600)));
            }
            cache = cache.with_store(store);
        }
        Ok(Self::new(config, provider, Arc::new(cache)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<GraphCache> {
        &self.cache
    }

    /// Curated anchors of a known area
    pub fn anchors(&self, place: &str) -> Option<&AreaAnchors> {
        self.config.anchors(place)
    }

    /// Street graph of a place.
    ///
    /// Tries the memory cache, the disk cache, each geocoding query in order
    /// and finally the configured bounding box; the first success is cached
    /// and returned. `force_reload` skips both caches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GraphUnavailable`] listing every failed attempt
    pub fn load_graph(&self, place: &str, force_reload: bool) -> Result<Arc<StreetGraph>, Error> {
        let key = self.config.canonical_key(place);
        if key.is_empty() {
            return Err(Error::GraphUnavailable {
                place: place.to_string(),
                attempts: Vec::new(),
            });
        }

        if force_reload {
            let graph = self.load_uncached(place, &key, true)?;
            self.cache.insert(&key, Arc::clone(&graph));
            return Ok(graph);
        }

        if let Some(graph) = self.cache.get(&key) {
            debug!("Graph cache hit for '{key}'");
            return Ok(graph);
        }
        self.cache
            .get_or_try_load(&key, || self.load_uncached(place, &key, false))
    }

    /// Disk cache then provider chain; the caller puts the result in memory
    fn load_uncached(
        &self,
        place: &str,
        key: &str,
        force_reload: bool,
    ) -> Result<Arc<StreetGraph>, Error> {
        let mut attempts = Vec::new();

        if !force_reload && self.cache.has_store() {
            match self.cache.load_stored(key) {
                Ok(Some(graph)) if !graph.is_empty() && graph.edge_count() > 0 => {
                    return Ok(Arc::new(graph));
                }
                Ok(Some(_)) => attempts.push(StrategyFailure {
                    strategy: LoadStrategy::DiskCache,
                    reason: "cached graph is empty".to_string(),
                }),
                Ok(None) => attempts.push(StrategyFailure {
                    strategy: LoadStrategy::DiskCache,
                    reason: "not cached".to_string(),
                }),
                Err(e) => {
                    warn!("Disk cache read failed for '{key}': {e}");
                    attempts.push(StrategyFailure {
                        strategy: LoadStrategy::DiskCache,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let graph = self.fetch(place, &mut attempts);
        let Some(graph) = graph else {
            warn!(
                "No street graph for '{place}' after {} attempts",
                attempts.len()
            );
            return Err(Error::GraphUnavailable {
                place: place.to_string(),
                attempts,
            });
        };

        if let Err(e) = self.cache.persist(key, &graph) {
            warn!("Could not write '{key}' to the disk cache: {e}");
        }
        let graph = Arc::new(graph);
        info!(
            "Loaded street graph for '{place}' ({} nodes, {} edges)",
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn fetch(&self, place: &str, attempts: &mut Vec<StrategyFailure>) -> Option<StreetGraph> {
        for query in self.config.query_variations(place) {
            let strategy = LoadStrategy::Query(query.clone());
            match accept(self.provider.fetch_place(&query)) {
                Ok(graph) => {
                    debug!("Loaded '{place}' via {strategy}");
                    return Some(graph);
                }
                Err(e) => {
                    debug!("Attempt {strategy} for '{place}' failed: {e}");
                    attempts.push(StrategyFailure {
                        strategy,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let bbox = self.config.area(place).and_then(|area| area.bbox)?;
        match accept(self.provider.fetch_bbox(&bbox)) {
            Ok(graph) => {
                info!("Loaded '{place}' from its bounding box");
                Some(graph)
            }
            Err(e) => {
                attempts.push(StrategyFailure {
                    strategy: LoadStrategy::BoundingBox,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

/// Rejects partial results: a graph without nodes or edges is a failure
fn accept(result: Result<StreetGraph, ProviderError>) -> Result<StreetGraph, ProviderError> {
    let graph = result?;
    if graph.is_empty() || graph.edge_count() == 0 {
        return Err(ProviderError::EmptyNetwork);
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::loading::{cache::MemoryStore, config::BoundingBox};
    use crate::model::StreetEdge;

    fn street(seed: i64) -> StreetGraph {
        let mut graph = StreetGraph::new();
        let a = graph.add_node(seed, -0.13, 51.5).unwrap();
        let b = graph.add_node(seed + 1, -0.129, 51.5).unwrap();
        graph.add_street(a, b, StreetEdge::new(69.0)).unwrap();
        graph
    }

    /// Serves graphs for a fixed set of queries and counts the calls
    #[derive(Default)]
    struct FakeProvider {
        known: Vec<String>,
        bbox_works: bool,
        empty_for: Vec<String>,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl MapProvider for FakeProvider {
        fn geocode(&self, query: &str) -> Result<BoundingBox, ProviderError> {
            Err(ProviderError::NotFound(query.to_string()))
        }

        fn fetch_bbox(&self, _bbox: &BoundingBox) -> Result<StreetGraph, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.bbox_works {
                Ok(street(100))
            } else {
                Err(ProviderError::Parse("overpass timeout".into()))
            }
        }

        fn fetch_place(&self, query: &str) -> Result<StreetGraph, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            if self.empty_for.iter().any(|q| q == query) {
                return Ok(StreetGraph::new());
            }
            if self.known.iter().any(|q| q == query) {
                Ok(street(1))
            } else {
                Err(ProviderError::NotFound(query.to_string()))
            }
        }
    }

    const CONFIG: &str = r#"
[[areas]]
key = "city_of_london"
display_name = "City of London"
aliases = ["The City"]
bbox = { min_lon = -0.1144, min_lat = 51.5067, max_lon = -0.0725, max_lat = 51.5233 }
"#;

    fn loader(provider: FakeProvider, cache: GraphCache) -> GraphLoader {
        GraphLoader::new(
            Config::from_toml_str(CONFIG).unwrap(),
            provider,
            Arc::new(cache),
        )
    }

    #[test]
    fn first_successful_query_wins_and_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FakeProvider {
            known: vec!["Camden, London, UK".into(), "Camden".into()],
            calls: Arc::clone(&calls),
            ..FakeProvider::default()
        };
        let loader = loader(provider, GraphCache::new(4));

        let graph = loader.load_graph("Camden", false).unwrap();
        assert_eq!(graph.node_count(), 2);
        // borough-qualified query failed, city-qualified succeeded
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let again = loader.load_graph("  camden ", false).unwrap();
        assert!(Arc::ptr_eq(&graph, &again));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bounding_box_fallback_for_problem_areas() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FakeProvider {
            bbox_works: true,
            calls: Arc::clone(&calls),
            ..FakeProvider::default()
        };
        let loader = loader(provider, GraphCache::new(4));

        let graph = loader.load_graph("The City", false).unwrap();
        assert!(graph.node_by_osm_id(100).is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn unavailable_lists_every_attempt() {
        let provider = FakeProvider {
            empty_for: vec!["City of London".into()],
            ..FakeProvider::default()
        };
        let loader = loader(provider, GraphCache::new(4).with_store(MemoryStore::new()));

        let Err(Error::GraphUnavailable { place, attempts }) =
            loader.load_graph("City of London", false)
        else {
            panic!("expected GraphUnavailable");
        };
        assert_eq!(place, "City of London");
        let strategies: Vec<_> = attempts.iter().map(|a| a.strategy.clone()).collect();
        assert_eq!(
            strategies,
            vec![
                LoadStrategy::DiskCache,
                LoadStrategy::Query(
                    "City of London, London Borough of City of London, London, UK".into()
                ),
                LoadStrategy::Query("City of London, London, UK".into()),
                LoadStrategy::Query("City of London".into()),
                LoadStrategy::BoundingBox,
            ]
        );
        assert!(attempts[3].reason.contains("empty"));
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn unknown_place_without_bbox_has_no_bbox_attempt() {
        let loader = loader(FakeProvider::default(), GraphCache::new(4));
        let Err(Error::GraphUnavailable { attempts, .. }) = loader.load_graph("Atlantis", false)
        else {
            panic!("expected GraphUnavailable");
        };
        assert_eq!(attempts.len(), 3);
        assert!(
            attempts
                .iter()
                .all(|a| matches!(a.strategy, LoadStrategy::Query(_)))
        );
    }

    #[test]
    fn force_reload_bypasses_caches() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FakeProvider {
            known: vec!["Hackney".into()],
            calls: Arc::clone(&calls),
            ..FakeProvider::default()
        };
        let loader = loader(provider, GraphCache::new(4));

        let first = loader.load_graph("Hackney", false).unwrap();
        let calls_after_first = calls.load(Ordering::SeqCst);
        let reloaded = loader.load_graph("Hackney", true).unwrap();
        assert!(!Arc::ptr_eq(&first, &reloaded));
        assert_eq!(calls.load(Ordering::SeqCst), calls_after_first * 2);
        assert!(Arc::ptr_eq(&reloaded, &loader.load_graph("Hackney", false).unwrap()));
    }

    #[test]
    fn disk_cache_survives_a_new_loader() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let make = |calls: &Arc<AtomicUsize>| {
            let provider = FakeProvider {
                known: vec!["Islington".into()],
                calls: Arc::clone(calls),
                ..FakeProvider::default()
            };
            loader(provider, GraphCache::new(2).with_store(DiskStore::new(dir.path())))
        };

        make(&calls).load_graph("Islington", false).unwrap();
        let fetched = calls.load(Ordering::SeqCst);
        assert!(dir.path().join("islington.json").exists());

        let graph = make(&calls).load_graph("Islington", false).unwrap();
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), fetched);
    }

    #[test]
    fn concurrent_requests_for_one_key_load_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let provider = FakeProvider {
            known: vec!["Southwark".into()],
            delay: Some(Duration::from_millis(20)),
            calls: Arc::clone(&calls),
            ..FakeProvider::default()
        };
        let loader = loader(provider, GraphCache::new(4));

        let graphs: Vec<Arc<StreetGraph>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| loader.load_graph("Southwark", false).unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        // three query variations, the last one succeeds, exactly once
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(graphs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
