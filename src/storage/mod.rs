//! Flat-buffer storage engine for the typed directed multigraph.
//!
//! The whole graph lives in two contiguous word buffers: one map of
//! (node, edge-type) records and one map of edge records. Bucket chains and
//! the per-node in/out adjacency lists are intrusive, stored as word offsets
//! inside the records themselves, so a buffer can be handed to another
//! execution context by reference and read without any decoding step.

mod adjacency;
mod edge_map;
mod node_map;
mod shared_map;
mod stats;
mod word;

pub use adjacency::{AdjacencyList, AdjacencyListOptions, AllEdges, SerializedAdjacency};
pub use stats::AdjacencyStats;
pub use word::Word;
