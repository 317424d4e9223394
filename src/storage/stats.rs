//! Observability snapshot of the adjacency engine.

use std::collections::HashMap;

use serde::Serialize;

use crate::storage::edge_map::EdgeTypeMap;
use crate::storage::node_map::NodeTypeMap;
use crate::storage::word::Word;

/// Point-in-time statistics for an [`crate::AdjacencyList`].
///
/// `uniformity` is the standard chi-squared-style ratio over the edge hash
/// buckets, `Σ b(b+1)/2 / ((n/2c)(n + 2c − 1))`; a value near `1.0` means
/// the hash is distributing keys like a uniform random function would.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AdjacencyStats {
    /// Number of node ids minted so far.
    pub nodes: u32,
    /// Number of live (node, edge-type) records.
    pub node_edge_types: usize,
    /// Node map bucket-table capacity.
    pub node_capacity: usize,
    /// Node buffer size in bytes.
    pub node_buffer_bytes: usize,
    /// Node map load (max of id density and record density).
    pub node_load: f64,
    /// Number of live edges.
    pub edges: usize,
    /// Number of tombstoned edge slots awaiting a rebuild.
    pub deleted: usize,
    /// Edge map bucket-table capacity.
    pub edge_capacity: usize,
    /// Edge buffer size in bytes.
    pub edge_buffer_bytes: usize,
    /// Edge map load counting live edges only.
    pub edge_load: f64,
    /// Edge map load counting live edges plus tombstones.
    pub edge_load_with_deletes: f64,
    /// Total number of edges sharing a bucket with an earlier edge.
    pub collisions: usize,
    /// Longest bucket chain minus one.
    pub max_collisions: usize,
    /// Mean collisions per occupied bucket.
    pub avg_collisions: f64,
    /// Hash distribution quality; ~1.0 is uniform.
    pub uniformity: f64,
}

pub(crate) fn collect<W: Word>(
    nodes: &NodeTypeMap<W>,
    edges: &EdgeTypeMap<W>,
) -> AdjacencyStats {
    let mut buckets: HashMap<usize, usize> = HashMap::new();
    for edge in edges.live_items() {
        let hash = edges.hash(edges.from(edge), edges.to(edge), edges.type_of(edge));
        *buckets.entry(hash).or_insert(0) += 1;
    }

    let mut collisions = 0usize;
    let mut max_collisions = 0usize;
    let mut occupancy_sum = 0f64;
    for &size in buckets.values() {
        max_collisions = max_collisions.max(size - 1);
        collisions += size - 1;
        occupancy_sum += (size * (size + 1)) as f64 / 2.0;
    }

    let live = edges.count();
    let capacity = edges.capacity();
    let expected = (live as f64 / (2.0 * capacity as f64)) * (live + 2 * capacity - 1) as f64;
    let uniformity = if expected > 0.0 {
        occupancy_sum / expected
    } else {
        0.0
    };
    let avg_collisions = if buckets.is_empty() {
        0.0
    } else {
        collisions as f64 / buckets.len() as f64
    };

    AdjacencyStats {
        nodes: nodes.next_id(),
        node_edge_types: nodes.count(),
        node_capacity: nodes.capacity(),
        node_buffer_bytes: nodes.byte_len(),
        node_load: nodes.load(),
        edges: live,
        deleted: edges.deletes(),
        edge_capacity: capacity,
        edge_buffer_bytes: edges.byte_len(),
        edge_load: edges.load_for(live),
        edge_load_with_deletes: edges.load_for(live + edges.deletes()),
        collisions,
        max_collisions,
        avg_collisions,
        uniformity,
    }
}
