//! Shared flat hash-map primitive underlying both typed maps.
//!
//! One contiguous word buffer holds everything:
//!
//! ```text
//! [ header | bucket-table (capacity words) | item region (capacity * BUCKET_SIZE * ITEM_WORDS words) ]
//! ```
//!
//! Bucket-table entries and all link fields are word offsets from the start
//! of the buffer; `0` is null. An item is live while its `type` word is
//! nonzero. Collisions chain through each item's `next` word. The concrete
//! maps extend the two base header words (`capacity`, `count`) and the two
//! base item words (`next`, `type`) through their [`Schema`].

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{FilamentError, Result};
use crate::storage::word::Word;

/// Average number of items reserved per hash bucket at target load.
pub(crate) const BUCKET_SIZE: usize = 2;

/// Smallest permitted bucket-table capacity.
pub(crate) const MIN_CAPACITY: usize = 2;

/// Header word holding the bucket-table capacity.
const CAPACITY: usize = 0;
/// Header word holding the live item count.
const COUNT: usize = 1;

/// Item word linking to the next item in the same hash bucket.
pub(crate) const NEXT: usize = 0;
/// Item word holding the type tag; `0` marks a free or tombstoned slot.
pub(crate) const TYPE: usize = 1;

/// Layout descriptor extending the base header and item schemas.
///
/// Stands in for the source's subclassing: a concrete map fixes its header
/// and item width at compile time and the base operates on the shared
/// prefix. No runtime dispatch is involved.
pub(crate) trait Schema {
    const HEADER_WORDS: usize;
    const ITEM_WORDS: usize;
}

/// Flat, shareable hash map of fixed-width typed items.
///
/// The buffer is `Arc`-backed: snapshots alias it at zero cost and mutation
/// is copy-on-write, so a snapshot holder keeps observing the bytes it
/// captured while the owning map moves on.
pub(crate) struct SharedTypeMap<W: Word, S: Schema> {
    data: Arc<Vec<W>>,
    _schema: PhantomData<S>,
}

impl<W: Word, S: Schema> Clone for SharedTypeMap<W, S> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            _schema: PhantomData,
        }
    }
}

impl<W: Word, S: Schema> SharedTypeMap<W, S> {
    /// Total buffer length in words for a given bucket-table capacity.
    #[inline]
    pub(crate) fn length_for(capacity: usize) -> usize {
        S::HEADER_WORDS + capacity + capacity * BUCKET_SIZE * S::ITEM_WORDS
    }

    /// Largest capacity whose highest item offset still fits the word width.
    #[inline]
    pub(crate) fn max_capacity() -> usize {
        (W::MAX_ADDRESS - S::HEADER_WORDS) / (S::ITEM_WORDS * BUCKET_SIZE + 1)
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        debug_assert!(capacity >= MIN_CAPACITY);
        debug_assert!(capacity <= Self::max_capacity());
        let mut data = vec![W::ZERO; Self::length_for(capacity)];
        data[CAPACITY] = W::from_usize(capacity);
        Self {
            data: Arc::new(data),
            _schema: PhantomData,
        }
    }

    /// Adopts an existing buffer, validating that its length matches the
    /// length implied by the capacity header.
    pub(crate) fn from_buffer(data: Arc<Vec<W>>) -> Result<Self> {
        if data.is_empty() {
            return Err(FilamentError::Corrupt("map buffer is empty"));
        }
        let capacity = data[CAPACITY].to_usize();
        if capacity < MIN_CAPACITY {
            return Err(FilamentError::Corrupt("map capacity below minimum"));
        }
        if Self::length_for(capacity) != data.len() {
            return Err(FilamentError::Corrupt(
                "map buffer length disagrees with header capacity",
            ));
        }
        Ok(Self {
            data,
            _schema: PhantomData,
        })
    }

    /// Aliases the underlying buffer without copying.
    #[inline]
    pub(crate) fn share(&self) -> Arc<Vec<W>> {
        Arc::clone(&self.data)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub(crate) fn byte_len(&self) -> usize {
        self.data.len() * W::BYTES
    }

    #[inline]
    pub(crate) fn word(&self, offset: usize) -> usize {
        self.data[offset].to_usize()
    }

    #[inline]
    pub(crate) fn set_word(&mut self, offset: usize, value: usize) {
        Arc::make_mut(&mut self.data)[offset] = W::from_usize(value);
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.word(CAPACITY)
    }

    #[inline]
    pub(crate) fn count(&self) -> usize {
        self.word(COUNT)
    }

    /// First word of the item region.
    #[inline]
    pub(crate) fn item_region(&self) -> usize {
        S::HEADER_WORDS + self.capacity()
    }

    /// Offset of the `index`-th item slot.
    #[inline]
    pub(crate) fn item_at(&self, index: usize) -> usize {
        self.item_region() + index * S::ITEM_WORDS
    }

    #[inline]
    pub(crate) fn load(&self) -> f64 {
        self.load_for(self.count())
    }

    /// Load the map would have if it held `count` items.
    #[inline]
    pub(crate) fn load_for(&self, count: usize) -> f64 {
        count as f64 / (self.capacity() * BUCKET_SIZE) as f64
    }

    /// Head of the bucket chain for `hash`, or `None` for an empty bucket.
    #[inline]
    pub(crate) fn head(&self, hash: usize) -> Option<usize> {
        debug_assert!(hash < self.capacity());
        match self.word(S::HEADER_WORDS + hash) {
            0 => None,
            head => Some(head),
        }
    }

    /// Successor of `item` in its bucket chain.
    #[inline]
    pub(crate) fn next_of(&self, item: usize) -> Option<usize> {
        match self.word(item + NEXT) {
            0 => None,
            next => Some(next),
        }
    }

    /// Type tag of `item`; `0` means the slot is free or tombstoned.
    #[inline]
    pub(crate) fn type_of(&self, item: usize) -> u32 {
        self.word(item + TYPE) as u32
    }

    /// Marks `item` live with `ty` and appends it to the bucket chain.
    pub(crate) fn link(&mut self, hash: usize, item: usize, ty: u32) {
        debug_assert!(hash < self.capacity());
        debug_assert!(ty != 0);
        debug_assert!(item + S::ITEM_WORDS <= self.len());
        self.set_word(item + TYPE, ty as usize);
        let bucket = S::HEADER_WORDS + hash;
        match self.word(bucket) {
            0 => self.set_word(bucket, item),
            head => {
                let mut tail = head;
                while let Some(next) = self.next_of(tail) {
                    tail = next;
                }
                self.set_word(tail + NEXT, item);
            }
        }
        let count = self.count() + 1;
        self.set_word(COUNT, count);
    }

    /// Clears `item`'s type and splices it out of the bucket chain.
    ///
    /// The predecessor is found by walking the chain from the head; callers
    /// guarantee `item` is linked under `hash`.
    pub(crate) fn unlink(&mut self, hash: usize, item: usize) {
        debug_assert!(hash < self.capacity());
        self.set_word(item + TYPE, 0);
        let bucket = S::HEADER_WORDS + hash;
        let next = self.word(item + NEXT);
        let head = self.word(bucket);
        if head == item {
            self.set_word(bucket, next);
        } else {
            let mut prev = head;
            loop {
                match self.word(prev + NEXT) {
                    0 => {
                        debug_assert!(false, "item missing from its bucket chain");
                        break;
                    }
                    candidate if candidate == item => {
                        self.set_word(prev + NEXT, next);
                        break;
                    }
                    candidate => prev = candidate,
                }
            }
        }
        self.set_word(item + NEXT, 0);
        let count = self.count() - 1;
        self.set_word(COUNT, count);
    }

    /// Iterates the offsets of all live items in buffer-scan order.
    pub(crate) fn live_items(&self) -> LiveItems<'_, W, S> {
        LiveItems {
            map: self,
            addr: self.item_region(),
            remaining: self.count(),
        }
    }

    /// Copies a snapshot from a smaller or equal-capacity map into this one,
    /// rebasing bucket heads and chain links by the capacity delta.
    ///
    /// Growing the bucket table shifts the item region, so every stored
    /// offset that points into the item region of *this* buffer moves by
    /// `delta`. Offsets held in the wider item words (the extension fields)
    /// point into other buffers and are copied untouched.
    pub(crate) fn set_from(&mut self, source: &Self) -> Result<()> {
        let src_capacity = source.capacity();
        let dst_capacity = self.capacity();
        if src_capacity > dst_capacity {
            return Err(FilamentError::CapacityTooSmall {
                required: src_capacity,
                actual: dst_capacity,
            });
        }
        let delta = dst_capacity - src_capacity;

        for offset in COUNT..S::HEADER_WORDS {
            self.set_word(offset, source.word(offset));
        }

        for index in 0..src_capacity {
            let head = source.word(S::HEADER_WORDS + index);
            let rebased = if head == 0 { 0 } else { head + delta };
            self.set_word(S::HEADER_WORDS + index, rebased);
        }

        let src_base = S::HEADER_WORDS + src_capacity;
        let dst_base = S::HEADER_WORDS + dst_capacity;
        let item_words = src_capacity * BUCKET_SIZE * S::ITEM_WORDS;
        Arc::make_mut(&mut self.data)[dst_base..dst_base + item_words]
            .copy_from_slice(&source.data[src_base..src_base + item_words]);

        for slot in 0..src_capacity * BUCKET_SIZE {
            let next = dst_base + slot * S::ITEM_WORDS + NEXT;
            let value = self.word(next);
            if value != 0 {
                self.set_word(next, value + delta);
            }
        }
        Ok(())
    }

    /// Encodes the buffer as little-endian bytes.
    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.byte_len());
        for &word in self.data.iter() {
            word.write_le(&mut out);
        }
        out
    }

    /// Decodes one map from the front of `bytes`, returning it along with
    /// the number of bytes consumed.
    pub(crate) fn from_bytes_prefix(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < W::BYTES {
            return Err(FilamentError::Corrupt("map buffer too short for header"));
        }
        let capacity = W::read_le(&bytes[..W::BYTES]).to_usize();
        if capacity < MIN_CAPACITY {
            return Err(FilamentError::Corrupt("map capacity below minimum"));
        }
        let byte_len = Self::length_for(capacity) * W::BYTES;
        if bytes.len() < byte_len {
            return Err(FilamentError::Corrupt(
                "map buffer length disagrees with header capacity",
            ));
        }
        let mut data = Vec::with_capacity(Self::length_for(capacity));
        for chunk in bytes[..byte_len].chunks_exact(W::BYTES) {
            data.push(W::read_le(chunk));
        }
        let map = Self::from_buffer(Arc::new(data))?;
        Ok((map, byte_len))
    }
}

/// Forward scan over the live items of a map.
///
/// Yields item offsets in buffer order, skipping free and tombstoned slots,
/// and stops once every live item has been produced.
pub(crate) struct LiveItems<'a, W: Word, S: Schema> {
    map: &'a SharedTypeMap<W, S>,
    addr: usize,
    remaining: usize,
}

impl<W: Word, S: Schema> Iterator for LiveItems<'_, W, S> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let len = self.map.len();
        while self.addr + S::ITEM_WORDS <= len {
            let item = self.addr;
            self.addr += S::ITEM_WORDS;
            if self.map.word(item + TYPE) != 0 {
                self.remaining -= 1;
                return Some(item);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}
