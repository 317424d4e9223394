//! Node-side typed map: one record per (node id, edge type) pair in use.
//!
//! A record carries the head and tail of that pair's inbound and outbound
//! edge lists. Records are created lazily the first time an edge touches
//! the pair and are destroyed only by a full map rebuild. The bucket index
//! of a record *is* the node id — ids are minted densely from the `next_id`
//! header word and the growth policy keeps every id below the capacity, so
//! no mixing step is needed.

use std::fmt;
use std::sync::Arc;

use crate::error::{FilamentError, Result};
use crate::storage::shared_map::{LiveItems, Schema, SharedTypeMap};
use crate::storage::word::Word;

/// Header word holding the next unminted node id.
const NEXT_ID: usize = 2;

/// Head of the record's inbound edge list.
const FIRST_IN: usize = 2;
/// Head of the record's outbound edge list.
const FIRST_OUT: usize = 3;
/// Tail of the record's inbound edge list.
const LAST_IN: usize = 4;
/// Tail of the record's outbound edge list.
const LAST_OUT: usize = 5;

pub(crate) struct NodeSchema;

impl Schema for NodeSchema {
    const HEADER_WORDS: usize = 3;
    const ITEM_WORDS: usize = 6;
}

/// Flat map of (node id, edge type) records with intrusive list endpoints.
///
/// The list endpoint words hold offsets into the *edge* map's buffer; only
/// the bucket chain (`next`) words point into this buffer. That distinction
/// is what lets [`NodeTypeMap::set_from`] rebase a grown table without
/// touching the endpoints.
#[derive(Clone)]
pub(crate) struct NodeTypeMap<W: Word> {
    map: SharedTypeMap<W, NodeSchema>,
}

impl<W: Word> NodeTypeMap<W> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            map: SharedTypeMap::with_capacity(capacity),
        }
    }

    pub(crate) fn from_buffer(data: Arc<Vec<W>>) -> Result<Self> {
        Ok(Self {
            map: SharedTypeMap::from_buffer(data)?,
        })
    }

    pub(crate) fn from_bytes_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        let (map, consumed) = SharedTypeMap::from_bytes_prefix(bytes)?;
        Ok((Self { map }, consumed))
    }

    #[inline]
    pub(crate) fn max_capacity() -> usize {
        SharedTypeMap::<W, NodeSchema>::max_capacity()
    }

    #[inline]
    pub(crate) fn share(&self) -> Arc<Vec<W>> {
        self.map.share()
    }

    #[inline]
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        self.map.to_bytes()
    }

    #[inline]
    pub(crate) fn byte_len(&self) -> usize {
        self.map.byte_len()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    pub(crate) fn item_region(&self) -> usize {
        self.map.item_region()
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.map.capacity()
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.map.count()
    }

    #[inline]
    pub(crate) fn next_id(&self) -> u32 {
        self.map.word(NEXT_ID) as u32
    }

    #[inline]
    pub(crate) fn set_next_id(&mut self, next_id: u32) {
        self.map.set_word(NEXT_ID, next_id as usize);
    }

    /// Mints the next node id. The sole producer of ids; no record is
    /// allocated until an edge first touches the id.
    pub(crate) fn take_id(&mut self) -> u32 {
        let id = self.next_id();
        self.set_next_id(id + 1);
        id
    }

    /// Combined load: the denser of hash occupancy and id occupancy.
    ///
    /// Ids double as bucket indexes, so the map must also grow before
    /// `next_id` reaches the capacity.
    pub(crate) fn load(&self) -> f64 {
        let id_load = self.next_id() as f64 / self.capacity() as f64;
        id_load.max(self.map.load())
    }

    /// Finds the record for `(node, ty)`, walking the node's bucket chain.
    pub(crate) fn address_of(&self, node: u32, ty: u32) -> Option<usize> {
        if (node as usize) >= self.capacity() {
            return None;
        }
        let mut cursor = self.map.head(node as usize);
        while let Some(record) = cursor {
            if self.map.type_of(record) == ty {
                return Some(record);
            }
            cursor = self.map.next_of(record);
        }
        None
    }

    /// Appends a fresh `(node, ty)` record and links it under the node's
    /// bucket. The id must have been minted already.
    pub(crate) fn add(&mut self, node: u32, ty: u32) -> Result<usize> {
        if node >= self.next_id() || (node as usize) >= self.capacity() {
            return Err(FilamentError::InvalidNodeId(node));
        }
        let record = self.map.item_at(self.count());
        self.map.link(node as usize, record, ty);
        Ok(record)
    }

    #[inline]
    pub(crate) fn head(&self, node: u32) -> Option<usize> {
        if (node as usize) >= self.capacity() {
            return None;
        }
        self.map.head(node as usize)
    }

    #[inline]
    pub(crate) fn next_of(&self, record: usize) -> Option<usize> {
        self.map.next_of(record)
    }

    #[inline]
    pub(crate) fn type_of(&self, record: usize) -> u32 {
        self.map.type_of(record)
    }

    #[inline]
    pub(crate) fn first_in(&self, record: usize) -> Option<usize> {
        nonnull(self.map.word(record + FIRST_IN))
    }

    #[inline]
    pub(crate) fn first_out(&self, record: usize) -> Option<usize> {
        nonnull(self.map.word(record + FIRST_OUT))
    }

    #[inline]
    pub(crate) fn last_in(&self, record: usize) -> Option<usize> {
        nonnull(self.map.word(record + LAST_IN))
    }

    #[inline]
    pub(crate) fn last_out(&self, record: usize) -> Option<usize> {
        nonnull(self.map.word(record + LAST_OUT))
    }

    /// Makes `edge` the tail of the record's inbound list and returns the
    /// previous tail, which the caller must chain to `edge` on the edge
    /// side. Returns `None` when the list was empty.
    pub(crate) fn link_in(&mut self, record: usize, edge: usize) -> Option<usize> {
        let prev_tail = self.map.word(record + LAST_IN);
        if self.map.word(record + FIRST_IN) == 0 {
            self.map.set_word(record + FIRST_IN, edge);
        }
        self.map.set_word(record + LAST_IN, edge);
        nonnull(prev_tail)
    }

    /// Outbound twin of [`NodeTypeMap::link_in`].
    pub(crate) fn link_out(&mut self, record: usize, edge: usize) -> Option<usize> {
        let prev_tail = self.map.word(record + LAST_OUT);
        if self.map.word(record + FIRST_OUT) == 0 {
            self.map.set_word(record + FIRST_OUT, edge);
        }
        self.map.set_word(record + LAST_OUT, edge);
        nonnull(prev_tail)
    }

    /// Repairs the record's inbound endpoints after `edge` leaves the list.
    ///
    /// `prev` and `next` are the edge's neighbors, read off the edge record
    /// before the edge-side splice. Splicing those neighbors together is
    /// the edge map's job, not this map's.
    pub(crate) fn unlink_in(
        &mut self,
        record: usize,
        edge: usize,
        prev: Option<usize>,
        next: Option<usize>,
    ) {
        if self.map.word(record + LAST_IN) == edge {
            self.map.set_word(record + LAST_IN, prev.unwrap_or(0));
        }
        if self.map.word(record + FIRST_IN) == edge {
            self.map.set_word(record + FIRST_IN, next.unwrap_or(0));
        }
    }

    /// Outbound twin of [`NodeTypeMap::unlink_in`].
    pub(crate) fn unlink_out(
        &mut self,
        record: usize,
        edge: usize,
        prev: Option<usize>,
        next: Option<usize>,
    ) {
        if self.map.word(record + LAST_OUT) == edge {
            self.map.set_word(record + LAST_OUT, prev.unwrap_or(0));
        }
        if self.map.word(record + FIRST_OUT) == edge {
            self.map.set_word(record + FIRST_OUT, next.unwrap_or(0));
        }
    }

    #[inline]
    pub(crate) fn live_items(&self) -> LiveItems<'_, W, NodeSchema> {
        self.map.live_items()
    }

    pub(crate) fn set_from(&mut self, source: &Self) -> Result<()> {
        self.map.set_from(&source.map)
    }
}

#[inline]
fn nonnull(value: usize) -> Option<usize> {
    if value == 0 {
        None
    } else {
        Some(value)
    }
}

impl<W: Word> fmt::Debug for NodeTypeMap<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeTypeMap")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .field("next_id", &self.next_id())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_id_is_dense_and_monotonic() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(8);
        assert_eq!(nodes.take_id(), 0);
        assert_eq!(nodes.take_id(), 1);
        assert_eq!(nodes.take_id(), 2);
        assert_eq!(nodes.next_id(), 3);
        assert_eq!(nodes.count(), 0);
    }

    #[test]
    fn add_requires_minted_id() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(8);
        assert!(matches!(
            nodes.add(0, 1),
            Err(crate::FilamentError::InvalidNodeId(0))
        ));
        nodes.take_id();
        assert!(nodes.add(0, 1).is_ok());
    }

    #[test]
    fn records_chain_per_node() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(8);
        let id = nodes.take_id();
        let first = nodes.add(id, 1).unwrap();
        let second = nodes.add(id, 2).unwrap();

        assert_eq!(nodes.address_of(id, 1), Some(first));
        assert_eq!(nodes.address_of(id, 2), Some(second));
        assert_eq!(nodes.address_of(id, 3), None);
        assert_eq!(nodes.next_of(first), Some(second));
        assert_eq!(nodes.count(), 2);
    }

    #[test]
    fn link_in_tracks_head_and_tail() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(8);
        let id = nodes.take_id();
        let record = nodes.add(id, 1).unwrap();

        assert_eq!(nodes.link_in(record, 100), None);
        assert_eq!(nodes.first_in(record), Some(100));
        assert_eq!(nodes.last_in(record), Some(100));

        assert_eq!(nodes.link_in(record, 108), Some(100));
        assert_eq!(nodes.first_in(record), Some(100));
        assert_eq!(nodes.last_in(record), Some(108));

        // The outbound list is independent.
        assert_eq!(nodes.first_out(record), None);
    }

    #[test]
    fn unlink_in_repairs_endpoints_only() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(8);
        let id = nodes.take_id();
        let record = nodes.add(id, 1).unwrap();
        nodes.link_in(record, 100);
        nodes.link_in(record, 108);
        nodes.link_in(record, 116);

        // Interior removal leaves both endpoints alone.
        nodes.unlink_in(record, 108, Some(100), Some(116));
        assert_eq!(nodes.first_in(record), Some(100));
        assert_eq!(nodes.last_in(record), Some(116));

        // Head removal advances the head.
        nodes.unlink_in(record, 100, None, Some(116));
        assert_eq!(nodes.first_in(record), Some(116));

        // Tail removal retreats the tail; list is now empty.
        nodes.unlink_in(record, 116, None, None);
        assert_eq!(nodes.first_in(record), None);
        assert_eq!(nodes.last_in(record), None);
    }

    #[test]
    fn load_covers_id_exhaustion() {
        let mut nodes = NodeTypeMap::<u32>::with_capacity(4);
        for _ in 0..3 {
            nodes.take_id();
        }
        // 3 ids over capacity 4 dominates 0 records over 8 slots.
        assert!((nodes.load() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn set_from_preserves_next_id_and_endpoints() {
        let mut small = NodeTypeMap::<u32>::with_capacity(2);
        let id = small.take_id();
        let record = small.add(id, 1).unwrap();
        small.link_in(record, 500);
        small.link_out(record, 700);

        let mut grown = NodeTypeMap::<u32>::with_capacity(4);
        grown.set_from(&small).unwrap();

        let delta = 4 - 2;
        let moved = record + delta;
        assert_eq!(grown.next_id(), 1);
        assert_eq!(grown.address_of(id, 1), Some(moved));
        // Endpoints address the edge buffer and must not be rebased.
        assert_eq!(grown.first_in(moved), Some(500));
        assert_eq!(grown.first_out(moved), Some(700));
    }
}
