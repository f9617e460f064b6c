//! Two-level graph cache: a bounded in-memory LRU in front of a pluggable store.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use hashbrown::HashMap;
use log::{debug, info, warn};
use moka::{policy::EvictionPolicy, sync::Cache};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::{
    Error,
    model::{OsmNodeId, StreetEdge, StreetGraph},
};

/// Bump when the cached graph layout changes
pub const CACHE_VERSION: u32 = 1;

/// Persistent storage of built graphs, keyed by canonical area key
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` on a miss, including unreadable or outdated entries
    fn load(&self, key: &str) -> Result<Option<StreetGraph>, Error>;
    fn store(&self, key: &str, graph: &StreetGraph) -> Result<(), Error>;
    fn remove(&self, key: &str) -> Result<(), Error>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedNode {
    id: OsmNodeId,
    lon: f64,
    lat: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedEdge {
    from: OsmNodeId,
    to: OsmNodeId,
    #[serde(flatten)]
    edge: StreetEdge,
}

/// On-disk envelope of a street graph
#[derive(Debug, Serialize, Deserialize)]
struct CachedGraph {
    version: u32,
    key: String,
    created_at: DateTime<Utc>,
    nodes: Vec<CachedNode>,
    edges: Vec<CachedEdge>,
}

impl CachedGraph {
    fn from_graph(key: &str, graph: &StreetGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|(_, node)| CachedNode {
                id: node.id,
                lon: node.geometry.x(),
                lat: node.geometry.y(),
            })
            .collect();
        let edges = graph
            .edge_references()
            .filter_map(|edge| {
                let from = graph.node(edge.source())?.id;
                let to = graph.node(edge.target())?.id;
                Some(CachedEdge {
                    from,
                    to,
                    edge: edge.weight().clone(),
                })
            })
            .collect();
        Self {
            version: CACHE_VERSION,
            key: key.to_string(),
            created_at: Utc::now(),
            nodes,
            edges,
        }
    }

    fn into_graph(self) -> Result<StreetGraph, Error> {
        let mut graph = StreetGraph::new();
        for node in self.nodes {
            graph.add_node(node.id, node.lon, node.lat)?;
        }
        for CachedEdge { from, to, edge } in self.edges {
            let (Some(from), Some(to)) = (graph.node_by_osm_id(from), graph.node_by_osm_id(to))
            else {
                return Err(Error::CacheError(format!(
                    "Cached edge references unknown node {from} or {to}"
                )));
            };
            graph.add_edge(from, to, edge)?;
        }
        Ok(graph)
    }
}

/// JSON files in a directory, one per key, replaced atomically
#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
    max_age: Option<TimeDelta>,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            max_age: None,
        }
    }

    /// Entries older than `max_age` are discarded on load
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = TimeDelta::from_std(max_age).ok();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn discard(path: &Path, reason: &str) {
        warn!("Discarding cached graph {}: {reason}", path.display());
        if let Err(e) = fs::remove_file(path) {
            debug!("Could not remove {}: {e}", path.display());
        }
    }
}

impl CacheStore for DiskStore {
    fn load(&self, key: &str) -> Result<Option<StreetGraph>, Error> {
        let path = self.path(key);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let cached: CachedGraph = match serde_json::from_reader(BufReader::new(file)) {
            Ok(cached) => cached,
            Err(e) => {
                Self::discard(&path, &e.to_string());
                return Ok(None);
            }
        };
        if cached.version != CACHE_VERSION {
            Self::discard(
                &path,
                &format!("version {} instead of {CACHE_VERSION}", cached.version),
            );
            return Ok(None);
        }
        let age = Utc::now().signed_duration_since(cached.created_at);
        if self.max_age.is_some_and(|max_age| age > max_age) {
            Self::discard(
                &path,
                &format!("cached {} hours ago", age.num_hours()),
            );
            return Ok(None);
        }

        match cached.into_graph() {
            Ok(graph) => {
                info!(
                    "Loaded '{key}' from disk cache: {} nodes, {} edges",
                    graph.node_count(),
                    graph.edge_count()
                );
                Ok(Some(graph))
            }
            Err(e) => {
                Self::discard(&path, &e.to_string());
                Ok(None)
            }
        }
    }

    fn store(&self, key: &str, graph: &StreetGraph) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path(key);
        let tmp = self.dir.join(format!(".{key}.json.tmp"));

        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &CachedGraph::from_graph(key, graph))
            .map_err(|e| Error::CacheError(e.to_string()))?;
        writer.flush()?;
        drop(writer);

        fs::rename(&tmp, &path)?;
        debug!("Stored '{key}' in {}", path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, handy for tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: Mutex<HashMap<String, StreetGraph>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}

impl CacheStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<StreetGraph>, Error> {
        Ok(self
            .graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn store(&self, key: &str, graph: &StreetGraph) -> Result<(), Error> {
        self.graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), graph.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), Error> {
        self.graphs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Bounded LRU of built graphs backed by an optional persistent store.
///
/// Readers only ever receive an `Arc` to a fully built graph.
pub struct GraphCache {
    capacity: usize,
    memory: Cache<String, Arc<StreetGraph>>,
    store: Option<Box<dyn CacheStore>>,
}

impl std::fmt::Debug for GraphCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

impl GraphCache {
    /// Memory-only cache holding at most `capacity` graphs
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let memory = Cache::builder()
            .max_capacity(capacity as u64)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(|key, _graph, cause| {
                if cause.was_evicted() {
                    debug!("Evicted '{key}' from graph cache");
                }
            })
            .build();
        Self {
            capacity,
            memory,
            store: None,
        }
    }

    pub fn with_store(mut self, store: impl CacheStore + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.memory.run_pending_tasks();
        usize::try_from(self.memory.entry_count()).unwrap_or(usize::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_store(&self) -> bool {
        self.store.is_some()
    }

    /// Memory lookup, marking the entry as recently used
    pub fn get(&self, key: &str) -> Option<Arc<StreetGraph>> {
        self.memory.get(key)
    }

    /// Inserts into memory, evicting the least recently used graphs over capacity
    pub fn insert(&self, key: &str, graph: Arc<StreetGraph>) {
        self.memory.insert(key.to_string(), graph);
        self.memory.run_pending_tasks();
    }

    /// Memory lookup, running `load` on a miss and caching its result.
    ///
    /// Concurrent callers for the same key wait for a single `load`.
    ///
    /// # Errors
    ///
    /// The error of `load`; callers that waited on it get a copy
    pub fn get_or_try_load<F>(&self, key: &str, load: F) -> Result<Arc<StreetGraph>, Error>
    where
        F: FnOnce() -> Result<Arc<StreetGraph>, Error>,
    {
        let result = self.memory.try_get_with(key.to_string(), load).map_err(unshare);
        self.memory.run_pending_tasks();
        result
    }

    /// Lookup in the persistent store; `Ok(None)` without a store
    ///
    /// # Errors
    ///
    /// Propagates store read failures
    pub fn load_stored(&self, key: &str) -> Result<Option<StreetGraph>, Error> {
        match &self.store {
            Some(store) => store.load(key),
            None => Ok(None),
        }
    }

    /// # Errors
    ///
    /// Propagates store write failures
    pub fn persist(&self, key: &str, graph: &StreetGraph) -> Result<(), Error> {
        match &self.store {
            Some(store) => store.store(key, graph),
            None => Ok(()),
        }
    }

    /// Drops a key from memory and from the store
    ///
    /// # Errors
    ///
    /// Propagates store failures
    pub fn invalidate(&self, key: &str) -> Result<(), Error> {
        self.memory.invalidate(key);
        match &self.store {
            Some(store) => store.remove(key),
            None => Ok(()),
        }
    }
}

/// Owned error out of one shared between coalesced loads
fn unshare(error: Arc<Error>) -> Error {
    Arc::try_unwrap(error).unwrap_or_else(|shared| match shared.as_ref() {
        Error::GraphUnavailable { place, attempts } => Error::GraphUnavailable {
            place: place.clone(),
            attempts: attempts.clone(),
        },
        other => Error::CacheError(other.to_string()),
    })
}
