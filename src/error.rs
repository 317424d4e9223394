use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilamentError>;

/// Errors surfaced by the adjacency engine.
///
/// Duplicate edge insertion and removal of an absent edge are *not* errors;
/// those paths return `Ok(false)`. Every variant here is fatal for the
/// operation that produced it and is never retried internally.
#[derive(Debug, Error)]
pub enum FilamentError {
    #[error("capacity overflow: {0}")]
    CapacityOverflow(&'static str),
    #[error("invalid edge type: {0}")]
    InvalidEdgeType(u32),
    #[error("invalid node id: {0}")]
    InvalidNodeId(u32),
    #[error("corruption detected: {0}")]
    Corrupt(&'static str),
    #[error("inconsistent adjacency state: {0}")]
    Inconsistent(&'static str),
    #[error("target capacity {actual} is smaller than source capacity {required}")]
    CapacityTooSmall { required: usize, actual: usize },
}
