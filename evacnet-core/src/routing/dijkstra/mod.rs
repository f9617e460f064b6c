mod state;
pub mod traced_dijkstra;

pub(crate) use traced_dijkstra::{ShortestPath, dijkstra_path};
