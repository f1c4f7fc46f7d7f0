//! Insertion-ordered hash table for dictionary-mode keyed containers.
//!
//! Entries live in a slab and are addressed by `u32` index. Each entry is on
//! two lists at once: its bucket's collision chain (`next`) and the global
//! insertion-order list (`before` / `after`). Removal unlinks from both in
//! O(1) and recycles the slot through a free list.

use crate::value::Value;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::FusedIterator;
use std::mem;
use tessel_core::Symbol;

/// Null link.
const NIL: u32 = u32::MAX;

/// Smallest bucket array.
const MIN_BUCKETS: usize = 16;

// Fill factor 7/10.
const LOAD_NUMERATOR: usize = 7;
const LOAD_DENOMINATOR: usize = 10;

#[derive(Clone)]
struct Entry {
    key: Symbol,
    value: Value,
    hash: u64,
    /// Previous entry in insertion order.
    before: u32,
    /// Next entry in insertion order.
    after: u32,
    /// Next entry in the same bucket.
    next: u32,
}

#[inline]
fn hash_key(key: &Symbol) -> u64 {
    let mut hasher = FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Bucket count keeping `len` entries under the fill factor.
#[inline]
fn buckets_for(len: usize) -> usize {
    (len * LOAD_DENOMINATOR / LOAD_NUMERATOR + 1)
        .next_power_of_two()
        .max(MIN_BUCKETS)
}

/// Linked hash table preserving insertion order.
#[derive(Clone)]
pub struct DictTable {
    entries: Vec<Option<Entry>>,
    buckets: Vec<u32>,
    free: Vec<u32>,
    head: u32,
    tail: u32,
    len: usize,
}

impl DictTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty table sized for `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            buckets: vec![NIL; buckets_for(capacity)],
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Number of live entries.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the table has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get the value stored under `key`.
    pub fn get(&self, key: &Symbol) -> Option<&Value> {
        self.find(key).map(|index| &self.entry(index).value)
    }

    /// Check if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &Symbol) -> bool {
        self.find(key).is_some()
    }

    /// Insert or overwrite. Overwriting keeps the entry's position.
    pub fn insert(&mut self, key: Symbol, value: Value) -> Option<Value> {
        let hash = hash_key(&key);
        if let Some(index) = self.find_hashed(&key, hash) {
            return Some(mem::replace(&mut self.entry_mut(index).value, value));
        }

        if (self.len + 1) * LOAD_DENOMINATOR > self.buckets.len() * LOAD_NUMERATOR {
            self.rehash(self.buckets.len() * 2);
        }

        let bucket = self.bucket_of(hash);
        let entry = Entry {
            key,
            value,
            hash,
            before: self.tail,
            after: NIL,
            next: self.buckets[bucket],
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.entries[index as usize] = Some(entry);
                index
            }
            None => {
                self.entries.push(Some(entry));
                (self.entries.len() - 1) as u32
            }
        };

        self.buckets[bucket] = index;
        if self.tail == NIL {
            self.head = index;
        } else {
            let tail = self.tail;
            self.entry_mut(tail).after = index;
        }
        self.tail = index;
        self.len += 1;
        None
    }

    /// Remove `key`, closing the gap in insertion order.
    pub fn remove(&mut self, key: &Symbol) -> Option<Value> {
        let hash = hash_key(key);
        let bucket = self.bucket_of(hash);

        let mut prev = NIL;
        let mut index = self.buckets[bucket];
        while index != NIL {
            let entry = self.entry(index);
            if entry.hash == hash && entry.key == *key {
                break;
            }
            prev = index;
            index = entry.next;
        }
        if index == NIL {
            return None;
        }

        let Some(entry) = self.entries[index as usize].take() else {
            unreachable!("linked slot {index} is vacant");
        };

        if prev == NIL {
            self.buckets[bucket] = entry.next;
        } else {
            self.entry_mut(prev).next = entry.next;
        }
        if entry.before == NIL {
            self.head = entry.after;
        } else {
            self.entry_mut(entry.before).after = entry.after;
        }
        if entry.after == NIL {
            self.tail = entry.before;
        } else {
            self.entry_mut(entry.after).before = entry.before;
        }

        self.free.push(index);
        self.len -= 1;
        Some(entry.value)
    }

    /// A dense copy without free slots, sized for the current length.
    pub fn compacted(&self) -> Self {
        let mut table = Self::with_capacity(self.len);
        for (key, value) in self.iter() {
            table.insert(key.clone(), value.clone());
        }
        table
    }

    /// Iterate entries in insertion order.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            next: self.head,
            remaining: self.len,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    #[inline]
    fn bucket_of(&self, hash: u64) -> usize {
        (hash as usize) & (self.buckets.len() - 1)
    }

    #[inline]
    fn entry(&self, index: u32) -> &Entry {
        match &self.entries[index as usize] {
            Some(entry) => entry,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }

    #[inline]
    fn entry_mut(&mut self, index: u32) -> &mut Entry {
        match &mut self.entries[index as usize] {
            Some(entry) => entry,
            None => unreachable!("linked slot {index} is vacant"),
        }
    }

    #[inline]
    fn find(&self, key: &Symbol) -> Option<u32> {
        self.find_hashed(key, hash_key(key))
    }

    fn find_hashed(&self, key: &Symbol, hash: u64) -> Option<u32> {
        let mut index = self.buckets[self.bucket_of(hash)];
        while index != NIL {
            let entry = self.entry(index);
            if entry.hash == hash && entry.key == *key {
                return Some(index);
            }
            index = entry.next;
        }
        None
    }

    /// Rebuild the collision chains over `bucket_count` buckets.
    fn rehash(&mut self, bucket_count: usize) {
        debug_assert!(bucket_count.is_power_of_two());
        self.buckets = vec![NIL; bucket_count];
        let mask = bucket_count - 1;

        let mut index = self.head;
        while index != NIL {
            let Some(entry) = self.entries[index as usize].as_mut() else {
                unreachable!("linked slot {index} is vacant");
            };
            let bucket = (entry.hash as usize) & mask;
            entry.next = self.buckets[bucket];
            self.buckets[bucket] = index;
            index = entry.after;
        }

        tracing::trace!(len = self.len, buckets = bucket_count, "rehashed dictionary table");
    }
}

impl Default for DictTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DictTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl FromIterator<(Symbol, Value)> for DictTable {
    fn from_iter<I: IntoIterator<Item = (Symbol, Value)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut table = Self::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            table.insert(key, value);
        }
        table
    }
}

impl<'a> IntoIterator for &'a DictTable {
    type Item = (&'a Symbol, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Insertion-order iterator over a `DictTable`.
pub struct Iter<'a> {
    table: &'a DictTable,
    next: u32,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Symbol, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.next == NIL {
            return None;
        }
        let entry = self.table.entry(self.next);
        self.next = entry.after;
        self.remaining -= 1;
        Some((&entry.key, &entry.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}
