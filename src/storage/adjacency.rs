//! The adjacency engine: a typed directed multigraph over two flat maps.
//!
//! [`AdjacencyList`] composes a [`NodeTypeMap`] and an [`EdgeTypeMap`] and
//! owns the capacity policy that keeps both below their target load. Every
//! mutation is synchronous and single-writer; reads are plain buffer walks.
//! Snapshots alias the buffers at zero cost (§ serialize), and a rebuild
//! swaps in fresh buffers so an outstanding snapshot keeps the bytes it
//! captured.
//!
//! # Capacity policy
//!
//! Both maps target a load of at most [`LOAD_FACTOR`]. Nodes always grow by
//! doubling. Edges grow by a factor interpolated from [`MAX_GROW_FACTOR`]
//! down to [`MIN_GROW_FACTOR`] as the capacity approaches
//! [`PEAK_CAPACITY`] — small maps grow aggressively to amortize rebuilds,
//! large maps conservatively to bound memory spikes — and shrink by
//! [`SHRINK_FACTOR`] when a rebuild finds the live load below
//! [`UNLOAD_FACTOR`]. Edge removal only tombstones; the tombstones are
//! dropped at the next rebuild, and a rebuild triggered while tombstones
//! dominate (their share of slots above [`UNLOAD_FACTOR`]) sizes the new
//! table from the live count alone, compacting instead of growing.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{FilamentError, Result};
use crate::storage::edge_map::{EdgeSchema, EdgeTypeMap, PEAK_CAPACITY};
use crate::storage::node_map::{NodeSchema, NodeTypeMap};
use crate::storage::shared_map::{LiveItems, Schema, BUCKET_SIZE, MIN_CAPACITY};
use crate::storage::stats::{self, AdjacencyStats};
use crate::storage::word::Word;
use crate::types::{Edge, EdgeType, InboundEdge, NodeId, OutboundEdge, TypeFilter};

/// Load above which a map is rebuilt before the next insertion.
const LOAD_FACTOR: f64 = 0.7;
/// Live load below which an edge rebuild halves the capacity.
const UNLOAD_FACTOR: f64 = 0.3;
/// Edge grow factor at minimal capacity.
const MAX_GROW_FACTOR: f64 = 8.0;
/// Edge grow factor at and beyond [`PEAK_CAPACITY`]; also the node factor.
const MIN_GROW_FACTOR: f64 = 2.0;
/// Capacity factor applied when a rebuild shrinks.
const SHRINK_FACTOR: f64 = 0.5;

/// Construction options for [`AdjacencyList`].
#[derive(Clone, Copy, Debug)]
pub struct AdjacencyListOptions {
    /// Initial node bucket-table capacity. Clamped up to the minimum of 2.
    pub node_capacity: usize,
    /// Initial edge bucket-table capacity. Clamped up to the minimum of 2.
    pub edge_capacity: usize,
}

impl Default for AdjacencyListOptions {
    fn default() -> Self {
        Self {
            node_capacity: MIN_CAPACITY,
            edge_capacity: MIN_CAPACITY,
        }
    }
}

impl AdjacencyListOptions {
    /// Sets the initial node capacity.
    pub fn node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    /// Sets the initial edge capacity.
    pub fn edge_capacity(mut self, capacity: usize) -> Self {
        self.edge_capacity = capacity;
        self
    }
}

/// Zero-copy snapshot of an [`AdjacencyList`]'s backing buffers.
///
/// The vectors are aliased, not copied. The engine mutates copy-on-write,
/// so a held snapshot keeps observing exactly the bytes captured here.
/// [`AdjacencyList::deserialize`] adopts a snapshot back into a live map.
#[derive(Clone)]
pub struct SerializedAdjacency<W: Word = u32> {
    /// Raw node map buffer: `capacity | count | nextId | buckets | items`.
    pub nodes: Arc<Vec<W>>,
    /// Raw edge map buffer: `capacity | count | deletes | buckets | items`.
    pub edges: Arc<Vec<W>>,
}

impl<W: Word> SerializedAdjacency<W> {
    /// Node buffer size in bytes.
    pub fn node_bytes(&self) -> usize {
        self.nodes.len() * W::BYTES
    }

    /// Edge buffer size in bytes.
    pub fn edge_bytes(&self) -> usize {
        self.edges.len() * W::BYTES
    }
}

impl<W: Word> fmt::Debug for SerializedAdjacency<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedAdjacency")
            .field("node_bytes", &self.node_bytes())
            .field("edge_bytes", &self.edge_bytes())
            .finish()
    }
}

/// Compact, serializable typed directed multigraph.
///
/// Nodes are bare integer ids; parallel edges between the same endpoints are
/// distinguished by a nonzero [`EdgeType`]. The default word width is
/// `u32`; `u16` and `u8` shrink the footprint and the capacity ceiling
/// proportionally.
#[derive(Clone)]
pub struct AdjacencyList<W: Word = u32> {
    nodes: NodeTypeMap<W>,
    edges: EdgeTypeMap<W>,
}

impl<W: Word> Default for AdjacencyList<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Word> AdjacencyList<W> {
    /// Creates an empty graph with minimal capacities.
    pub fn new() -> Self {
        Self {
            nodes: NodeTypeMap::with_capacity(MIN_CAPACITY),
            edges: EdgeTypeMap::with_capacity(MIN_CAPACITY),
        }
    }

    /// Creates an empty graph with explicit initial capacities.
    pub fn with_options(options: AdjacencyListOptions) -> Result<Self> {
        let node_capacity = options.node_capacity.max(MIN_CAPACITY);
        let edge_capacity = options.edge_capacity.max(MIN_CAPACITY);
        if node_capacity > NodeTypeMap::<W>::max_capacity() {
            return Err(FilamentError::CapacityOverflow(
                "node capacity above the limit for this word width",
            ));
        }
        if edge_capacity > EdgeTypeMap::<W>::max_capacity() {
            return Err(FilamentError::CapacityOverflow(
                "edge capacity above the limit for this word width",
            ));
        }
        Ok(Self {
            nodes: NodeTypeMap::with_capacity(node_capacity),
            edges: EdgeTypeMap::with_capacity(edge_capacity),
        })
    }

    /// Adopts previously serialized buffers.
    ///
    /// Both buffer lengths must match the lengths implied by their capacity
    /// headers exactly.
    pub fn deserialize(buffers: SerializedAdjacency<W>) -> Result<Self> {
        Ok(Self {
            nodes: NodeTypeMap::from_buffer(buffers.nodes)?,
            edges: EdgeTypeMap::from_buffer(buffers.edges)?,
        })
    }

    /// Hands out the backing buffers without copying.
    pub fn serialize(&self) -> SerializedAdjacency<W> {
        SerializedAdjacency {
            nodes: self.nodes.share(),
            edges: self.edges.share(),
        }
    }

    /// Encodes both buffers as little-endian bytes, nodes first.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.nodes.to_bytes();
        out.extend_from_slice(&self.edges.to_bytes());
        out
    }

    /// Decodes a graph from [`AdjacencyList::to_bytes`] output.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (nodes, consumed) = NodeTypeMap::from_bytes_prefix(bytes)?;
        let (edges, edge_consumed) = EdgeTypeMap::from_bytes_prefix(&bytes[consumed..])?;
        if consumed + edge_consumed != bytes.len() {
            return Err(FilamentError::Corrupt("trailing bytes after edge buffer"));
        }
        Ok(Self { nodes, edges })
    }

    /// Number of node ids minted so far.
    #[inline]
    pub fn node_count(&self) -> u32 {
        self.nodes.next_id()
    }

    /// Number of live edges.
    #[inline]
    pub fn edge_count(&self) -> usize {
        self.edges.count()
    }

    /// Mints a new node id.
    ///
    /// No storage is allocated for the node until an edge first touches it;
    /// the id alone is the node. Grows the node map when minting pushes its
    /// load beyond the target.
    pub fn add_node(&mut self) -> Result<NodeId> {
        if self.nodes.next_id() as usize >= NodeTypeMap::<W>::max_capacity() {
            return Err(FilamentError::CapacityOverflow("node id space exhausted"));
        }
        let id = self.nodes.take_id();
        if self.nodes.load() > LOAD_FACTOR {
            let capacity = Self::next_node_capacity(self.nodes.capacity())?;
            self.resize_nodes(capacity)?;
        }
        Ok(NodeId(id))
    }

    /// Inserts the edge `(from, to, ty)`.
    ///
    /// Returns `Ok(false)` without touching the graph when the triple is
    /// already present. Self-loops are allowed; parallel edges require
    /// distinct types. Both endpoints must be minted ids.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, ty: EdgeType) -> Result<bool> {
        if ty.0 == 0 || ty.0 as usize > W::MAX_ADDRESS {
            return Err(FilamentError::InvalidEdgeType(ty.0));
        }

        let mut hash = self.edges.hash(from.0, to.0, ty.0);
        if self.edges.address_of(hash, from.0, to.0, ty.0).is_some() {
            return Ok(false);
        }

        let count = self.edges.count() + 1;
        let deletes = self.edges.deletes();
        let total = count + deletes;
        if self.edges.load_for(total) > LOAD_FACTOR {
            let new_capacity = if self.edges.load_for(deletes) > UNLOAD_FACTOR {
                // Tombstones dominate the table: size the rebuild from the
                // live edges alone so it compacts instead of growing.
                self.next_edge_capacity(count)?
            } else {
                self.next_edge_capacity(total)?
            };
            self.rebuild_edges(new_capacity)?;
            hash = self.edges.hash(from.0, to.0, ty.0);
        }

        let to_missing = self.nodes.address_of(to.0, ty.0).is_none();
        let from_missing = self.nodes.address_of(from.0, ty.0).is_none();
        if (to_missing || from_missing) && self.nodes.load() >= LOAD_FACTOR {
            let capacity = Self::next_node_capacity(self.nodes.capacity())?;
            self.resize_nodes(capacity)?;
        }
        let to_node = match self.nodes.address_of(to.0, ty.0) {
            Some(record) => record,
            None => self.nodes.add(to.0, ty.0)?,
        };
        // Looked up again after the insert above so a self-loop reuses the
        // record instead of creating a twin.
        let from_node = match self.nodes.address_of(from.0, ty.0) {
            Some(record) => record,
            None => self.nodes.add(from.0, ty.0)?,
        };

        let edge = self.edges.add(hash, from.0, to.0, ty.0);
        if let Some(prev_tail) = self.nodes.link_in(to_node, edge) {
            self.edges.link_in(prev_tail, edge);
        }
        if let Some(prev_tail) = self.nodes.link_out(from_node, edge) {
            self.edges.link_out(prev_tail, edge);
        }
        Ok(true)
    }

    /// Removes the edge `(from, to, ty)`.
    ///
    /// Returns `Ok(false)` when the triple is absent. The slot is
    /// tombstoned, not reclaimed; space comes back at the next rebuild.
    pub fn remove_edge(&mut self, from: NodeId, to: NodeId, ty: EdgeType) -> Result<bool> {
        if ty.0 == 0 {
            return Ok(false);
        }
        let hash = self.edges.hash(from.0, to.0, ty.0);
        let edge = match self.edges.address_of(hash, from.0, to.0, ty.0) {
            Some(edge) => edge,
            None => return Ok(false),
        };

        let to_node = self
            .nodes
            .address_of(to.0, ty.0)
            .ok_or(FilamentError::Inconsistent(
                "live edge without a (to, type) record",
            ))?;
        let from_node = self
            .nodes
            .address_of(from.0, ty.0)
            .ok_or(FilamentError::Inconsistent(
                "live edge without a (from, type) record",
            ))?;

        let prev_in = self.edges.prev_in(edge);
        let next_in = self.edges.next_in(edge);
        let prev_out = self.edges.prev_out(edge);
        let next_out = self.edges.next_out(edge);

        self.nodes.unlink_in(to_node, edge, prev_in, next_in);
        self.nodes.unlink_out(from_node, edge, prev_out, next_out);
        self.edges.unlink(hash, edge);
        self.edges.unlink_in(edge);
        self.edges.unlink_out(edge);
        self.edges.delete(edge);
        Ok(true)
    }

    /// Whether an edge `(from, to)` exists under the filter.
    pub fn has_edge(&self, from: NodeId, to: NodeId, filter: impl Into<TypeFilter>) -> bool {
        match filter.into() {
            TypeFilter::Single(ty) => self.probe_edge(from, to, ty),
            TypeFilter::Any(types) => types.iter().any(|&ty| self.probe_edge(from, to, ty)),
            TypeFilter::All => {
                // Every type touching `from` has a record on its chain, so
                // probing those types covers the wildcard exactly.
                let mut record = self.nodes.head(from.0);
                while let Some(rec) = record {
                    if self.probe_edge(from, to, EdgeType(self.nodes.type_of(rec))) {
                        return true;
                    }
                    record = self.nodes.next_of(rec);
                }
                false
            }
        }
    }

    #[inline]
    fn probe_edge(&self, from: NodeId, to: NodeId, ty: EdgeType) -> bool {
        if ty.0 == 0 {
            return false;
        }
        let hash = self.edges.hash(from.0, to.0, ty.0);
        self.edges.address_of(hash, from.0, to.0, ty.0).is_some()
    }

    /// Whether any live edge points at `to`, regardless of type.
    pub fn has_inbound_edges(&self, to: NodeId) -> bool {
        let mut record = self.nodes.head(to.0);
        while let Some(rec) = record {
            if self.nodes.first_in(rec).is_some() {
                return true;
            }
            record = self.nodes.next_of(rec);
        }
        false
    }

    /// All inbound neighbors of `to` with their edge types, in per-type
    /// list order.
    pub fn get_inbound_edges_by_type(&self, to: NodeId) -> Vec<InboundEdge> {
        let mut result = Vec::new();
        let mut record = self.nodes.head(to.0);
        while let Some(rec) = record {
            let ty = EdgeType(self.nodes.type_of(rec));
            let mut cursor = self.nodes.first_in(rec);
            while let Some(edge) = cursor {
                result.push(InboundEdge {
                    from: NodeId(self.edges.from(edge)),
                    ty,
                });
                cursor = self.edges.next_in(edge);
            }
            record = self.nodes.next_of(rec);
        }
        result
    }

    /// All outbound neighbors of `from` with their edge types, in per-type
    /// list order.
    pub fn get_outbound_edges_by_type(&self, from: NodeId) -> Vec<OutboundEdge> {
        let mut result = Vec::new();
        let mut record = self.nodes.head(from.0);
        while let Some(rec) = record {
            let ty = EdgeType(self.nodes.type_of(rec));
            let mut cursor = self.nodes.first_out(rec);
            while let Some(edge) = cursor {
                result.push(OutboundEdge {
                    to: NodeId(self.edges.to(edge)),
                    ty,
                });
                cursor = self.edges.next_out(edge);
            }
            record = self.nodes.next_of(rec);
        }
        result
    }

    /// Distinct ids with an edge into `to` under the filter, in edge
    /// insertion order (first occurrence wins).
    pub fn get_node_ids_connected_to(
        &self,
        to: NodeId,
        filter: impl Into<TypeFilter>,
    ) -> Vec<NodeId> {
        let filter = filter.into();
        let mut found: Vec<(usize, u32)> = Vec::new();
        let mut record = self.nodes.head(to.0);
        while let Some(rec) = record {
            if filter.matches(EdgeType(self.nodes.type_of(rec))) {
                let mut cursor = self.nodes.first_in(rec);
                while let Some(edge) = cursor {
                    found.push((edge, self.edges.from(edge)));
                    cursor = self.edges.next_in(edge);
                }
            }
            record = self.nodes.next_of(rec);
        }
        collect_insertion_ordered(found)
    }

    /// Distinct ids `from` has an edge into under the filter, in edge
    /// insertion order (first occurrence wins).
    pub fn get_node_ids_connected_from(
        &self,
        from: NodeId,
        filter: impl Into<TypeFilter>,
    ) -> Vec<NodeId> {
        let filter = filter.into();
        let mut found: Vec<(usize, u32)> = Vec::new();
        let mut record = self.nodes.head(from.0);
        while let Some(rec) = record {
            if filter.matches(EdgeType(self.nodes.type_of(rec))) {
                let mut cursor = self.nodes.first_out(rec);
                while let Some(edge) = cursor {
                    found.push((edge, self.edges.to(edge)));
                    cursor = self.edges.next_out(edge);
                }
            }
            record = self.nodes.next_of(rec);
        }
        collect_insertion_ordered(found)
    }

    /// Iterates every live edge in buffer-scan order (approximately
    /// insertion order, with tombstones skipped).
    ///
    /// The iterator borrows the map; mutate only after dropping it.
    pub fn all_edges(&self) -> AllEdges<'_, W> {
        AllEdges {
            edges: &self.edges,
            inner: self.edges.live_items(),
        }
    }

    /// Current engine statistics.
    pub fn stats(&self) -> AdjacencyStats {
        stats::collect(&self.nodes, &self.edges)
    }

    /// Rebuilds the edge map at `capacity` (clamped so every live edge
    /// still fits), dropping tombstones.
    pub fn resize_edges(&mut self, capacity: usize) -> Result<()> {
        let capacity = capacity
            .max(MIN_CAPACITY)
            .max(self.edges.count().div_ceil(BUCKET_SIZE));
        if capacity > EdgeTypeMap::<W>::max_capacity() {
            return Err(FilamentError::CapacityOverflow("edge capacity limit reached"));
        }
        self.rebuild_edges(capacity)
    }

    /// Doubled node capacity, or an error at the width's ceiling.
    fn next_node_capacity(capacity: usize) -> Result<usize> {
        let grown = ((capacity as f64) * MIN_GROW_FACTOR).round() as usize;
        let new_capacity = grown.max(MIN_CAPACITY);
        if new_capacity > NodeTypeMap::<W>::max_capacity() {
            return Err(FilamentError::CapacityOverflow("node capacity limit reached"));
        }
        Ok(new_capacity)
    }

    /// Edge capacity for a rebuild that must hold `count` records.
    ///
    /// Above the load target the capacity grows by a factor interpolated
    /// from [`MAX_GROW_FACTOR`] at tiny capacities down to
    /// [`MIN_GROW_FACTOR`] at [`PEAK_CAPACITY`]; below the unload target it
    /// halves; in between it stays put (a rebuild at equal capacity still
    /// drops tombstones).
    fn next_edge_capacity(&self, count: usize) -> Result<usize> {
        let capacity = self.edges.capacity();
        let load = self.edges.load_for(count);
        let mut new_capacity = capacity;
        if load > LOAD_FACTOR {
            let peak_share = (capacity as f64 / PEAK_CAPACITY as f64).min(1.0);
            let grow = MAX_GROW_FACTOR + (MIN_GROW_FACTOR - MAX_GROW_FACTOR) * peak_share;
            new_capacity = ((capacity as f64) * grow).round() as usize;
        } else if load < UNLOAD_FACTOR {
            new_capacity = ((capacity as f64) * SHRINK_FACTOR).round() as usize;
        }
        new_capacity = new_capacity.max(count.div_ceil(BUCKET_SIZE)).max(MIN_CAPACITY);
        let limit = EdgeTypeMap::<W>::max_capacity();
        if new_capacity > limit {
            if count > limit * BUCKET_SIZE {
                return Err(FilamentError::CapacityOverflow("edge capacity limit reached"));
            }
            new_capacity = limit;
        }
        Ok(new_capacity)
    }

    /// Rebuilds the edge map by re-adding every live edge into a fresh
    /// pair of maps, then swaps them in. Node ids survive; tombstones and
    /// stale node records do not.
    fn rebuild_edges(&mut self, new_capacity: usize) -> Result<()> {
        let live = self.edges.count();
        let dropped = self.edges.deletes();
        let from_capacity = self.edges.capacity();

        let mut rebuilt = Self {
            nodes: NodeTypeMap::with_capacity(self.nodes.capacity()),
            edges: EdgeTypeMap::with_capacity(new_capacity),
        };
        rebuilt.nodes.set_next_id(self.nodes.next_id());
        for edge in self.edges.live_items() {
            rebuilt.add_edge(
                NodeId(self.edges.from(edge)),
                NodeId(self.edges.to(edge)),
                EdgeType(self.edges.type_of(edge)),
            )?;
        }
        if rebuilt.edges.count() != live {
            return Err(FilamentError::Inconsistent(
                "live edge count changed during rebuild",
            ));
        }
        debug!(
            from_capacity,
            to_capacity = new_capacity,
            live,
            dropped,
            "adjacency.resize_edges"
        );
        *self = rebuilt;
        Ok(())
    }

    /// Rebuilds the node map at `capacity`, rebasing bucket heads and chain
    /// links by the table growth. List endpoints address the edge buffer
    /// and survive untouched.
    fn resize_nodes(&mut self, capacity: usize) -> Result<()> {
        let from_capacity = self.nodes.capacity();
        let mut nodes = NodeTypeMap::with_capacity(capacity);
        nodes.set_from(&self.nodes)?;
        debug!(
            from_capacity,
            to_capacity = capacity,
            "adjacency.resize_nodes"
        );
        self.nodes = nodes;
        Ok(())
    }

    /// Walks every structural invariant of both maps.
    ///
    /// Returns the first violation as [`FilamentError::Inconsistent`].
    /// Intended for tests and corruption triage, not hot paths.
    pub fn verify(&self) -> Result<()> {
        self.verify_node_map()?;
        self.verify_edge_map()
    }

    fn verify_node_map(&self) -> Result<()> {
        let nodes = &self.nodes;
        if nodes.next_id() as usize > nodes.capacity() {
            return Err(FilamentError::Inconsistent("next_id beyond node capacity"));
        }

        let region = nodes.item_region();
        let slot_limit = nodes.capacity() * BUCKET_SIZE;
        let mut reachable = 0usize;
        for id in 0..nodes.capacity() as u32 {
            let mut steps = 0usize;
            let mut cursor = nodes.head(id);
            while let Some(record) = cursor {
                steps += 1;
                if steps > slot_limit {
                    return Err(FilamentError::Inconsistent("cycle in node bucket chain"));
                }
                if record < region
                    || record + NodeSchema::ITEM_WORDS > nodes.len()
                    || (record - region) % NodeSchema::ITEM_WORDS != 0
                {
                    return Err(FilamentError::Inconsistent("node chain points outside item region"));
                }
                let ty = nodes.type_of(record);
                if ty == 0 {
                    return Err(FilamentError::Inconsistent("free record on node bucket chain"));
                }
                if id >= nodes.next_id() {
                    return Err(FilamentError::Inconsistent("node record for unminted id"));
                }
                self.verify_in_list(id, record, ty)?;
                self.verify_out_list(id, record, ty)?;
                reachable += 1;
                cursor = nodes.next_of(record);
            }
        }
        if reachable != nodes.count() {
            return Err(FilamentError::Inconsistent("node count disagrees with chains"));
        }
        Ok(())
    }

    fn verify_in_list(&self, id: u32, record: usize, ty: u32) -> Result<()> {
        let limit = self.edges.count() + 1;
        let mut steps = 0usize;
        let mut last_seen = None;
        let mut cursor = self.nodes.first_in(record);
        while let Some(edge) = cursor {
            steps += 1;
            if steps > limit {
                return Err(FilamentError::Inconsistent("cycle in inbound edge list"));
            }
            if self.edges.to(edge) != id || self.edges.type_of(edge) != ty {
                return Err(FilamentError::Inconsistent("foreign edge on inbound list"));
            }
            last_seen = Some(edge);
            cursor = self.edges.next_in(edge);
        }
        if last_seen != self.nodes.last_in(record) {
            return Err(FilamentError::Inconsistent("inbound tail out of sync"));
        }
        Ok(())
    }

    fn verify_out_list(&self, id: u32, record: usize, ty: u32) -> Result<()> {
        let limit = self.edges.count() + 1;
        let mut steps = 0usize;
        let mut last_seen = None;
        let mut cursor = self.nodes.first_out(record);
        while let Some(edge) = cursor {
            steps += 1;
            if steps > limit {
                return Err(FilamentError::Inconsistent("cycle in outbound edge list"));
            }
            if self.edges.from(edge) != id || self.edges.type_of(edge) != ty {
                return Err(FilamentError::Inconsistent("foreign edge on outbound list"));
            }
            last_seen = Some(edge);
            cursor = self.edges.next_out(edge);
        }
        if last_seen != self.nodes.last_out(record) {
            return Err(FilamentError::Inconsistent("outbound tail out of sync"));
        }
        Ok(())
    }

    fn verify_edge_map(&self) -> Result<()> {
        let edges = &self.edges;
        let slot_limit = edges.capacity() * BUCKET_SIZE;
        if edges.count() + edges.deletes() > slot_limit {
            return Err(FilamentError::Inconsistent("edge occupancy beyond capacity"));
        }

        let region = edges.item_region();
        let mut reachable = 0usize;
        for bucket in 0..edges.capacity() {
            let mut steps = 0usize;
            let mut cursor = edges.head(bucket);
            while let Some(edge) = cursor {
                steps += 1;
                if steps > slot_limit {
                    return Err(FilamentError::Inconsistent("cycle in edge bucket chain"));
                }
                if edge < region
                    || edge + EdgeSchema::ITEM_WORDS > edges.len()
                    || (edge - region) % EdgeSchema::ITEM_WORDS != 0
                {
                    return Err(FilamentError::Inconsistent("edge chain points outside item region"));
                }
                let ty = edges.type_of(edge);
                if ty == 0 {
                    return Err(FilamentError::Inconsistent("tombstone on edge bucket chain"));
                }
                let expected = edges.hash(edges.from(edge), edges.to(edge), ty);
                if expected != bucket {
                    return Err(FilamentError::Inconsistent("edge chained under wrong bucket"));
                }
                reachable += 1;
                cursor = edges.next_of(edge);
            }
        }
        if reachable != edges.count() {
            return Err(FilamentError::Inconsistent("edge count disagrees with chains"));
        }
        Ok(())
    }
}

/// Restores edge insertion order across the per-type lists.
///
/// Record addresses are allocated monotonically and every intrusive list
/// appends at the tail, so each list is address-ascending and ordering the
/// union by address interleaves the lists back into insertion order.
fn collect_insertion_ordered(mut found: Vec<(usize, u32)>) -> Vec<NodeId> {
    found.sort_unstable_by_key(|&(edge, _)| edge);
    let mut seen = HashSet::with_capacity(found.len());
    let mut ids = Vec::with_capacity(found.len());
    for (_, id) in found {
        if seen.insert(id) {
            ids.push(NodeId(id));
        }
    }
    ids
}

/// Lazy forward iterator over the live edges of an [`AdjacencyList`].
pub struct AllEdges<'a, W: Word> {
    edges: &'a EdgeTypeMap<W>,
    inner: LiveItems<'a, W, EdgeSchema>,
}

impl<W: Word> Iterator for AllEdges<'_, W> {
    type Item = Edge;

    fn next(&mut self) -> Option<Edge> {
        let edge = self.inner.next()?;
        Some(Edge {
            from: NodeId(self.edges.from(edge)),
            to: NodeId(self.edges.to(edge)),
            ty: EdgeType(self.edges.type_of(edge)),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<W: Word> fmt::Debug for AdjacencyList<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjacencyList")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NULL_EDGE_TYPE;

    fn pair<W: Word>(graph: &mut AdjacencyList<W>) -> (NodeId, NodeId) {
        let a = graph.add_node().unwrap();
        let b = graph.add_node().unwrap();
        (a, b)
    }

    #[test]
    fn add_edge_rejects_type_zero() {
        let mut graph = AdjacencyList::<u32>::new();
        let (a, b) = pair(&mut graph);
        assert!(matches!(
            graph.add_edge(a, b, EdgeType(0)),
            Err(FilamentError::InvalidEdgeType(0))
        ));
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn add_edge_rejects_unminted_endpoint() {
        let mut graph = AdjacencyList::<u32>::new();
        let a = graph.add_node().unwrap();
        assert!(matches!(
            graph.add_edge(a, NodeId(99), NULL_EDGE_TYPE),
            Err(FilamentError::InvalidNodeId(99))
        ));
    }

    #[test]
    fn duplicate_add_is_a_noop() {
        let mut graph = AdjacencyList::<u32>::new();
        let (a, b) = pair(&mut graph);
        assert!(graph.add_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert!(!graph.add_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn remove_absent_edge_is_a_noop() {
        let mut graph = AdjacencyList::<u32>::new();
        let (a, b) = pair(&mut graph);
        assert!(!graph.remove_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert!(graph.add_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert!(graph.remove_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert!(!graph.remove_edge(a, b, NULL_EDGE_TYPE).unwrap());
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn second_node_doubles_capacity() {
        let mut graph = AdjacencyList::<u32>::new();
        assert_eq!(graph.stats().node_capacity, 2);
        graph.add_node().unwrap();
        assert_eq!(graph.stats().node_capacity, 2);
        // Minting id 1 puts the load at 1.0 and doubles the table.
        graph.add_node().unwrap();
        assert_eq!(graph.stats().node_capacity, 4);
    }

    #[test]
    fn grow_factor_interpolates_toward_peak() {
        let small = AdjacencyList::<u32>::with_options(
            AdjacencyListOptions::default().edge_capacity(2),
        )
        .unwrap();
        // Far below the peak the factor is effectively the maximum.
        assert_eq!(small.next_edge_capacity(3).unwrap(), 16);

        let at_peak = AdjacencyList::<u32>::with_options(
            AdjacencyListOptions::default().edge_capacity(PEAK_CAPACITY),
        )
        .unwrap();
        let grown = at_peak
            .next_edge_capacity(2 * PEAK_CAPACITY)
            .unwrap();
        assert_eq!(grown, 2 * PEAK_CAPACITY);
    }

    #[test]
    fn mid_load_keeps_capacity_and_low_load_halves_it() {
        let graph = AdjacencyList::<u32>::with_options(
            AdjacencyListOptions::default().edge_capacity(64),
        )
        .unwrap();
        // 64 live edges over 128 slots sits between the thresholds.
        assert_eq!(graph.next_edge_capacity(64).unwrap(), 64);
        // 16 over 128 is below the unload threshold.
        assert_eq!(graph.next_edge_capacity(16).unwrap(), 32);
    }

    #[test]
    fn shrink_never_goes_below_minimum() {
        let graph = AdjacencyList::<u32>::new();
        assert_eq!(graph.next_edge_capacity(0).unwrap(), MIN_CAPACITY);
    }

    #[test]
    fn rebuild_preserves_edges_and_drops_tombstones() {
        let mut graph = AdjacencyList::<u32>::new();
        let a = graph.add_node().unwrap();
        let b = graph.add_node().unwrap();
        let c = graph.add_node().unwrap();
        graph.add_edge(a, b, EdgeType(1)).unwrap();
        graph.add_edge(b, c, EdgeType(1)).unwrap();
        graph.add_edge(a, c, EdgeType(2)).unwrap();
        graph.remove_edge(b, c, EdgeType(1)).unwrap();

        graph.resize_edges(32).unwrap();
        assert_eq!(graph.stats().edge_capacity, 32);
        assert_eq!(graph.stats().deleted, 0);
        let edges: Vec<Edge> = graph.all_edges().collect();
        assert_eq!(
            edges,
            vec![
                Edge { from: a, to: b, ty: EdgeType(1) },
                Edge { from: a, to: c, ty: EdgeType(2) },
            ]
        );
        graph.verify().unwrap();
    }

    #[test]
    fn serialize_aliases_and_deserialize_adopts() {
        let mut graph = AdjacencyList::<u32>::new();
        let (a, b) = pair(&mut graph);
        graph.add_edge(a, b, NULL_EDGE_TYPE).unwrap();

        let snapshot = graph.serialize();
        let copy = AdjacencyList::deserialize(snapshot).unwrap();
        assert!(copy.has_edge(a, b, NULL_EDGE_TYPE));
        assert_eq!(copy.node_count(), 2);
        copy.verify().unwrap();
    }

    #[test]
    fn deserialize_rejects_truncated_buffer() {
        let graph = AdjacencyList::<u32>::new();
        let mut snapshot = graph.serialize();
        let mut bad = (*snapshot.nodes).clone();
        bad.pop();
        snapshot.nodes = Arc::new(bad);
        assert!(matches!(
            AdjacencyList::deserialize(snapshot),
            Err(FilamentError::Corrupt(_))
        ));
    }

    #[test]
    fn byte_codec_round_trips_the_whole_graph() {
        let mut graph = AdjacencyList::<u16>::new();
        let (a, b) = pair(&mut graph);
        graph.add_edge(a, b, EdgeType(3)).unwrap();

        let bytes = graph.to_bytes();
        let decoded = AdjacencyList::<u16>::from_bytes(&bytes).unwrap();
        assert!(decoded.has_edge(a, b, EdgeType(3)));
        assert_eq!(decoded.to_bytes(), bytes);

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            AdjacencyList::<u16>::from_bytes(&trailing),
            Err(FilamentError::Corrupt(_))
        ));
    }

    #[test]
    fn verify_accepts_a_busy_graph() {
        let mut graph = AdjacencyList::<u32>::new();
        let ids: Vec<NodeId> = (0..12).map(|_| graph.add_node().unwrap()).collect();
        for (i, &from) in ids.iter().enumerate() {
            for &to in &ids[i + 1..] {
                graph.add_edge(from, to, EdgeType(1 + (i as u32 % 3))).unwrap();
            }
        }
        for &to in &ids[6..] {
            graph.remove_edge(ids[0], to, EdgeType(1)).unwrap();
        }
        graph.verify().unwrap();
    }
}
