#![forbid(unsafe_code)]

pub mod error;
pub mod storage;
pub mod types;

pub use crate::error::{FilamentError, Result};
pub use crate::storage::{
    AdjacencyList, AdjacencyListOptions, AdjacencyStats, AllEdges, SerializedAdjacency, Word,
};
pub use crate::types::{
    Edge, EdgeType, InboundEdge, NodeId, OutboundEdge, TypeFilter, NULL_EDGE_TYPE,
};
