//! Edge-side typed map: one record per live (from, to, type) triple.
//!
//! Records are keyed by a mixed hash of the triple and additionally thread
//! two intrusive doubly-linked lists: the inbound list of the `to` node and
//! the outbound list of the `from` node, both per edge type. Removal
//! tombstones the slot (type, endpoints zeroed, `deletes` bumped); the space
//! comes back only when a rebuild copies the live records into a fresh
//! buffer.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::storage::shared_map::{LiveItems, Schema, SharedTypeMap};
use crate::storage::word::Word;

/// Header word counting tombstoned slots.
const DELETES: usize = 2;

/// Source node id.
const FROM: usize = 2;
/// Target node id.
const TO: usize = 3;
/// Next edge in the target node's inbound list for this type.
const NEXT_IN: usize = 4;
/// Previous edge in the target node's inbound list for this type.
const PREV_IN: usize = 5;
/// Next edge in the source node's outbound list for this type.
const NEXT_OUT: usize = 6;
/// Previous edge in the source node's outbound list for this type.
const PREV_OUT: usize = 7;

/// Capacity at which the grow factor has fully decayed to its minimum.
pub(crate) const PEAK_CAPACITY: usize = 1 << 18;

pub(crate) struct EdgeSchema;

impl Schema for EdgeSchema {
    const HEADER_WORDS: usize = 3;
    const ITEM_WORDS: usize = 8;
}

/// Flat map of edge records with tombstoning deletion.
#[derive(Clone)]
pub(crate) struct EdgeTypeMap<W: Word> {
    map: SharedTypeMap<W, EdgeSchema>,
}

/// 32-bit mixer applied to each key component before combining.
///
/// Must stay bit-identical across ports: bucket statistics and serialized
/// layouts depend on it. All arithmetic wraps modulo 2^32.
#[inline]
fn mix(mut k: u32) -> u32 {
    k = (!k).wrapping_add(k << 15);
    k ^= k >> 12;
    k = k.wrapping_add(k << 2);
    k ^= k >> 4;
    k = k.wrapping_mul(2057);
    k ^ (k >> 16)
}

impl<W: Word> EdgeTypeMap<W> {
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
        SharedTypeMap::<W, EdgeSchema>::max_capacity()
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
    pub(crate) fn deletes(&self) -> usize {
        self.map.word(DELETES)
    }

    #[inline]
    pub(crate) fn load_for(&self, count: usize) -> f64 {
        self.map.load_for(count)
    }

    /// Bucket index for a triple: multiplicative combine of the mixed
    /// components, reduced modulo the capacity.
    pub(crate) fn hash(&self, from: u32, to: u32, ty: u32) -> usize {
        let mut h: u32 = 17;
        h = h.wrapping_mul(37).wrapping_add(mix(from));
        h = h.wrapping_mul(37).wrapping_add(mix(to));
        h = h.wrapping_mul(37).wrapping_add(mix(ty));
        h as usize % self.capacity()
    }

    /// Next free slot. Tombstoned slots stay occupied until a rebuild, so
    /// allocation advances past `count + deletes` items.
    #[inline]
    fn next_address(&self) -> usize {
        self.map.item_at(self.count() + self.deletes())
    }

    /// Appends a record for the triple and links it under `hash`.
    pub(crate) fn add(&mut self, hash: usize, from: u32, to: u32, ty: u32) -> usize {
        debug_assert!(hash < self.capacity());
        let edge = self.next_address();
        self.map.link(hash, edge, ty);
        self.map.set_word(edge + FROM, from as usize);
        self.map.set_word(edge + TO, to as usize);
        edge
    }

    /// Finds the live record matching the full triple on the `hash` chain.
    pub(crate) fn address_of(&self, hash: usize, from: u32, to: u32, ty: u32) -> Option<usize> {
        let mut cursor = self.map.head(hash);
        while let Some(edge) = cursor {
            if self.map.type_of(edge) == ty && self.from(edge) == from && self.to(edge) == to {
                return Some(edge);
            }
            cursor = self.map.next_of(edge);
        }
        None
    }

    /// Tombstones a record: endpoints zeroed, `deletes` bumped. The type
    /// word was already cleared by [`EdgeTypeMap::unlink`].
    pub(crate) fn delete(&mut self, edge: usize) {
        self.map.set_word(edge + FROM, 0);
        self.map.set_word(edge + TO, 0);
        let deletes = self.deletes() + 1;
        self.map.set_word(DELETES, deletes);
    }

    #[inline]
    pub(crate) fn unlink(&mut self, hash: usize, edge: usize) {
        self.map.unlink(hash, edge);
    }

    #[inline]
    pub(crate) fn head(&self, hash: usize) -> Option<usize> {
        self.map.head(hash)
    }

    #[inline]
    pub(crate) fn next_of(&self, edge: usize) -> Option<usize> {
        self.map.next_of(edge)
    }

    #[inline]
    pub(crate) fn from(&self, edge: usize) -> u32 {
        self.map.word(edge + FROM) as u32
    }

    #[inline]
    pub(crate) fn to(&self, edge: usize) -> u32 {
        self.map.word(edge + TO) as u32
    }

    #[inline]
    pub(crate) fn type_of(&self, edge: usize) -> u32 {
        self.map.type_of(edge)
    }

    #[inline]
    pub(crate) fn next_in(&self, edge: usize) -> Option<usize> {
        nonnull(self.map.word(edge + NEXT_IN))
    }

    #[inline]
    pub(crate) fn prev_in(&self, edge: usize) -> Option<usize> {
        nonnull(self.map.word(edge + PREV_IN))
    }

    #[inline]
    pub(crate) fn next_out(&self, edge: usize) -> Option<usize> {
        nonnull(self.map.word(edge + NEXT_OUT))
    }

    #[inline]
    pub(crate) fn prev_out(&self, edge: usize) -> Option<usize> {
        nonnull(self.map.word(edge + PREV_OUT))
    }

    /// Extends an inbound list: `edge` becomes the successor of `prev`.
    pub(crate) fn link_in(&mut self, prev: usize, edge: usize) {
        self.map.set_word(prev + NEXT_IN, edge);
        self.map.set_word(edge + PREV_IN, prev);
    }

    /// Extends an outbound list: `edge` becomes the successor of `prev`.
    pub(crate) fn link_out(&mut self, prev: usize, edge: usize) {
        self.map.set_word(prev + NEXT_OUT, edge);
        self.map.set_word(edge + PREV_OUT, prev);
    }

    /// Splices `edge` out of its inbound list using its own link words,
    /// then clears both words on `edge`.
    pub(crate) fn unlink_in(&mut self, edge: usize) {
        let prev = self.map.word(edge + PREV_IN);
        let next = self.map.word(edge + NEXT_IN);
        if prev != 0 {
            self.map.set_word(prev + NEXT_IN, next);
        }
        if next != 0 {
            self.map.set_word(next + PREV_IN, prev);
        }
        self.map.set_word(edge + PREV_IN, 0);
        self.map.set_word(edge + NEXT_IN, 0);
    }

    /// Outbound twin of [`EdgeTypeMap::unlink_in`].
    pub(crate) fn unlink_out(&mut self, edge: usize) {
        let prev = self.map.word(edge + PREV_OUT);
        let next = self.map.word(edge + NEXT_OUT);
        if prev != 0 {
            self.map.set_word(prev + NEXT_OUT, next);
        }
        if next != 0 {
            self.map.set_word(next + PREV_OUT, prev);
        }
        self.map.set_word(edge + PREV_OUT, 0);
        self.map.set_word(edge + NEXT_OUT, 0);
    }

    #[inline]
    pub(crate) fn live_items(&self) -> LiveItems<'_, W, EdgeSchema> {
        self.map.live_items()
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

impl<W: Word> fmt::Debug for EdgeTypeMap<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EdgeTypeMap")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .field("deletes", &self.deletes())
            .finish()
    }
}
