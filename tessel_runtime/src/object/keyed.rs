//! Keyed containers: insertion-ordered maps laid out by shape.
//!
//! A keyed container stores only values; the key list and slot offsets come
//! from a shared `Shape`. Storage moves through three regimes as keys are
//! added:
//!
//! ```text
//! Inline      (0..=3 keys)        [Value; 3] inside the instance
//! Packed      (4..=threshold)     Arc<Vec<Value>>, slot = shape lookup
//! Dictionary  (beyond threshold)  Arc<DictTable>, shape = sentinel
//! ```
//!
//! # Copy-on-Write
//!
//! Cloning shares the packed array or table and marks *both* instances
//! aliased. The next in-place write on an aliased instance copies its
//! storage first and clears its own flag. Reads never look at the flag.
//!
//! # Two APIs
//!
//! `put` / `remove` / `clear` mutate in place and fail on a committed
//! instance. `updated` / `removed` / `updated_all` never touch the receiver
//! and always build fresh storage, so they work on committed instances too.

use crate::config::INLINE_SLOTS;
use crate::object::dict_table::{self, DictTable};
use crate::object::flags::{ContainerFlags, FlagCell, copy_with_capacity};
use crate::object::shape::{Shape, shape_trie};
use crate::value::Value;
use rustc_hash::FxHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::iter::{FusedIterator, Zip};
use std::marker::PhantomData;
use std::mem;
use std::slice;
use std::sync::Arc;
use tessel_core::{Symbol, TesselError, TesselResult, lookup_symbol};

// =============================================================================
// Families
// =============================================================================

/// Marker naming a keyed container family.
pub trait KeyedFamily: 'static {
    /// Name used in notation and error messages.
    const NAME: &'static str;
}

/// Family of general object/dictionary containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ObjectFamily;

impl KeyedFamily for ObjectFamily {
    const NAME: &'static str = "Object";
}

/// Family of attribute lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AttributeFamily;

impl KeyedFamily for AttributeFamily {
    const NAME: &'static str = "Attributes";
}

/// General keyed container.
pub type ObjectValue = Keyed<ObjectFamily>;

/// Attribute list.
pub type AttributeList = Keyed<AttributeFamily>;

// =============================================================================
// Storage
// =============================================================================

/// Storage regime of a keyed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regime {
    /// Up to three values held in the instance.
    Inline,
    /// Contiguous values indexed through the shape.
    Packed,
    /// Linked hash table; the shape is the dictionary sentinel.
    Dictionary,
}

enum Storage {
    Inline([Value; INLINE_SLOTS]),
    Packed(Arc<Vec<Value>>),
    Dictionary(Arc<DictTable>),
}

// =============================================================================
// Keyed Container
// =============================================================================

/// Insertion-ordered map from `Symbol` to `Value` whose layout is described
/// by a shared `Shape`.
pub struct Keyed<F: KeyedFamily> {
    flags: FlagCell,
    shape: Arc<Shape>,
    storage: Storage,
    family: PhantomData<fn() -> F>,
}

impl<F: KeyedFamily> Keyed<F> {
    /// Create an empty container on the root shape.
    pub fn new() -> Self {
        Self {
            flags: FlagCell::default(),
            shape: shape_trie().root(),
            storage: Storage::Inline(Default::default()),
            family: PhantomData,
        }
    }

    /// Create an empty container expecting `capacity` keys.
    ///
    /// A capacity beyond the packed threshold starts in dictionary mode.
    pub fn with_capacity(capacity: usize) -> Self {
        let trie = shape_trie();
        if capacity <= trie.config().packed_threshold {
            return Self::new();
        }
        Self {
            flags: FlagCell::default(),
            shape: trie.dictionary(),
            storage: Storage::Dictionary(Arc::new(DictTable::with_capacity(capacity))),
            family: PhantomData,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of entries.
    #[inline]
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Dictionary(table) => table.len(),
            _ => self.shape.len(),
        }
    }

    /// Check if the container has no entries.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The current shape. The dictionary sentinel in dictionary mode.
    #[inline]
    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    /// The current storage regime.
    pub fn regime(&self) -> Regime {
        match self.storage {
            Storage::Inline(_) => Regime::Inline,
            Storage::Packed(_) => Regime::Packed,
            Storage::Dictionary(_) => Regime::Dictionary,
        }
    }

    /// Current state bits.
    #[inline]
    pub fn flags(&self) -> ContainerFlags {
        self.flags.get()
    }

    /// Check whether storage may be shared with another instance.
    #[inline]
    pub fn is_aliased(&self) -> bool {
        self.flags.is_aliased()
    }

    /// Check whether the container is committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.flags.is_frozen()
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Get the value stored under `key`.
    pub fn get(&self, key: &Symbol) -> Option<&Value> {
        match &self.storage {
            Storage::Inline(slots) => self.shape.lookup(key).map(|slot| &slots[slot]),
            Storage::Packed(values) => self.shape.lookup(key).map(|slot| &values[slot]),
            Storage::Dictionary(table) => table.get(key),
        }
    }

    /// Get by key name without interning it.
    pub fn get_named(&self, name: &str) -> Option<&Value> {
        lookup_symbol(name).and_then(|key| self.get(&key))
    }

    /// Check if `key` is present.
    #[inline]
    pub fn contains_key(&self, key: &Symbol) -> bool {
        self.get(key).is_some()
    }

    /// Check if any entry holds `value`.
    pub fn contains_value(&self, value: &Value) -> bool {
        self.values().any(|v| v == value)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> Iter<'_> {
        match &self.storage {
            Storage::Inline(slots) => {
                Iter::Shaped(self.shape.fields().iter().zip(slots[..self.shape.len()].iter()))
            }
            Storage::Packed(values) => Iter::Shaped(self.shape.fields().iter().zip(values.iter())),
            Storage::Dictionary(table) => Iter::Dictionary(table.iter()),
        }
    }

    /// Iterate keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &Symbol> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Iterate values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.iter().map(|(_, value)| value)
    }

    // =========================================================================
    // In-place Mutation
    // =========================================================================

    /// Insert or overwrite, returning the previous value.
    pub fn put(&mut self, key: impl Into<Symbol>, value: Value) -> TesselResult<Option<Value>> {
        self.check_mutable()?;
        Ok(self.insert_field(key.into(), value))
    }

    /// Remove `key`, returning its value.
    ///
    /// Dictionary mode is kept even when few keys remain.
    pub fn remove(&mut self, key: &Symbol) -> TesselResult<Option<Value>> {
        self.check_mutable()?;
        Ok(self.remove_field(key))
    }

    /// Replace the entry for `key` with the result of `f`.
    ///
    /// `f` sees the current value; returning `None` removes the key.
    pub fn update<K, U>(&mut self, key: K, f: U) -> TesselResult<()>
    where
        K: Into<Symbol>,
        U: FnOnce(Option<&Value>) -> Option<Value>,
    {
        self.check_mutable()?;
        let key = key.into();
        match f(self.get(&key)) {
            Some(value) => {
                self.insert_field(key, value);
            }
            None => {
                self.remove_field(&key);
            }
        }
        Ok(())
    }

    /// Copy every entry of `other` into this container.
    pub fn put_all(&mut self, other: &Self) -> TesselResult<()> {
        self.check_mutable()?;
        for (key, value) in other {
            self.insert_field(key.clone(), value.clone());
        }
        Ok(())
    }

    /// Insert every pair from `iter`.
    pub fn try_extend<I>(&mut self, iter: I) -> TesselResult<()>
    where
        I: IntoIterator<Item = (Symbol, Value)>,
    {
        self.check_mutable()?;
        for (key, value) in iter {
            self.insert_field(key, value);
        }
        Ok(())
    }

    /// Reset to the empty shape and inline storage.
    pub fn clear(&mut self) -> TesselResult<()> {
        self.check_mutable()?;
        self.shape = shape_trie().root();
        self.storage = Storage::Inline(Default::default());
        self.flags.remove(ContainerFlags::ALIASED);
        Ok(())
    }

    // =========================================================================
    // Persistent API
    // =========================================================================

    /// A new container with `key` set to `value`. The receiver is unchanged.
    #[must_use]
    pub fn updated(&self, key: impl Into<Symbol>, value: Value) -> Self {
        let mut copy = self.detached_copy(1);
        copy.insert_field(key.into(), value);
        copy
    }

    /// A new container with every pair of `pairs` applied in order.
    #[must_use]
    pub fn updated_all<I>(&self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (Symbol, Value)>,
    {
        let pairs = pairs.into_iter();
        let mut copy = self.detached_copy(pairs.size_hint().0);
        for (key, value) in pairs {
            copy.insert_field(key, value);
        }
        copy
    }

    /// A new container without `key`. The receiver is unchanged.
    ///
    /// Dictionary containers that fall back within the packed threshold are
    /// rebuilt in shaped form.
    #[must_use]
    pub fn removed(&self, key: &Symbol) -> Self {
        if !self.contains_key(key) {
            return self.detached_copy(0);
        }

        if let Storage::Dictionary(table) = &self.storage {
            let remaining = table.len() - 1;
            if remaining <= shape_trie().config().packed_threshold {
                let mut rebuilt = Self::new();
                for (k, v) in table.iter().filter(|(k, _)| *k != key) {
                    rebuilt.insert_field(k.clone(), v.clone());
                }
                rebuilt.flags = self.flags.detached();
                return rebuilt;
            }
        }

        let mut copy = self.detached_copy(0);
        copy.remove_field(key);
        copy
    }

    // =========================================================================
    // Commit and Copies
    // =========================================================================

    /// Freeze this container and every value reachable from it.
    pub fn commit(&self) {
        self.flags.insert(ContainerFlags::FROZEN);
        for value in self.values() {
            value.commit();
        }
    }

    /// A mutable instance with the same entries, sharing storage.
    ///
    /// Works on committed containers; the copy is never committed.
    #[must_use]
    pub fn mutable_copy(&self) -> Self {
        let (flags, storage) = match &self.storage {
            Storage::Inline(slots) => (FlagCell::default(), Storage::Inline(slots.clone())),
            Storage::Packed(values) => {
                self.flags.insert(ContainerFlags::ALIASED);
                (
                    FlagCell::new(ContainerFlags::ALIASED),
                    Storage::Packed(Arc::clone(values)),
                )
            }
            Storage::Dictionary(table) => {
                self.flags.insert(ContainerFlags::ALIASED);
                (
                    FlagCell::new(ContainerFlags::ALIASED),
                    Storage::Dictionary(Arc::clone(table)),
                )
            }
        };
        Self {
            flags,
            shape: Arc::clone(&self.shape),
            storage,
            family: PhantomData,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_mutable(&self) -> TesselResult<()> {
        if self.flags.is_frozen() {
            return Err(TesselError::immutable(F::NAME));
        }
        Ok(())
    }

    /// Unshare storage if another instance may hold it.
    fn dealias(&mut self) {
        if !self.flags.take_aliased() {
            return;
        }
        match &mut self.storage {
            Storage::Inline(_) => {}
            Storage::Packed(values) => {
                let copy = copy_with_capacity(values, values.len() + 1);
                *values = Arc::new(copy);
            }
            Storage::Dictionary(table) => {
                let copy = DictTable::clone(table);
                *table = Arc::new(copy);
            }
        }
    }

    /// Same entries and frozen bit, storage owned by the new instance.
    fn detached_copy(&self, extra: usize) -> Self {
        let storage = match &self.storage {
            Storage::Inline(slots) => Storage::Inline(slots.clone()),
            Storage::Packed(values) => {
                Storage::Packed(Arc::new(copy_with_capacity(values, values.len() + extra)))
            }
            Storage::Dictionary(table) => Storage::Dictionary(Arc::new(table.compacted())),
        };
        Self {
            flags: self.flags.detached(),
            shape: Arc::clone(&self.shape),
            storage,
            family: PhantomData,
        }
    }

    fn insert_field(&mut self, key: Symbol, value: Value) -> Option<Value> {
        self.dealias();

        if let Storage::Dictionary(table) = &mut self.storage {
            return Arc::make_mut(table).insert(key, value);
        }

        if let Some(slot) = self.shape.lookup(&key) {
            let target = match &mut self.storage {
                Storage::Inline(slots) => &mut slots[slot],
                Storage::Packed(values) => &mut Arc::make_mut(values)[slot],
                Storage::Dictionary(_) => unreachable!("dictionary handled above"),
            };
            return Some(mem::replace(target, value));
        }

        let next = shape_trie().child_of(&self.shape, &key);
        if next.is_dictionary() {
            self.promote_to_dictionary(next, key, value);
            return None;
        }

        let slot = next.len() - 1;
        match &mut self.storage {
            Storage::Inline(slots) if slot < INLINE_SLOTS => slots[slot] = value,
            Storage::Inline(slots) => {
                let mut values = Vec::with_capacity((INLINE_SLOTS + 1).next_power_of_two());
                values.extend(slots.iter_mut().map(mem::take));
                values.push(value);
                self.storage = Storage::Packed(Arc::new(values));
                tracing::trace!(family = F::NAME, len = slot + 1, "promoted to packed storage");
            }
            Storage::Packed(values) => Arc::make_mut(values).push(value),
            Storage::Dictionary(_) => unreachable!("dictionary handled above"),
        }
        self.shape = next;
        None
    }

    fn promote_to_dictionary(&mut self, sentinel: Arc<Shape>, key: Symbol, value: Value) {
        let fields = self.shape.fields();
        let mut table = DictTable::with_capacity(fields.len() + 1);
        match mem::replace(&mut self.storage, Storage::Inline(Default::default())) {
            Storage::Inline(slots) => {
                for (k, v) in fields.iter().zip(slots) {
                    table.insert(k.clone(), v);
                }
            }
            Storage::Packed(values) => {
                let values = Arc::try_unwrap(values).unwrap_or_else(|shared| (*shared).clone());
                for (k, v) in fields.iter().zip(values) {
                    table.insert(k.clone(), v);
                }
            }
            Storage::Dictionary(_) => unreachable!("already in dictionary mode"),
        }
        table.insert(key, value);

        tracing::trace!(family = F::NAME, len = table.len(), "promoted to dictionary storage");
        self.storage = Storage::Dictionary(Arc::new(table));
        self.shape = sentinel;
    }

    fn remove_field(&mut self, key: &Symbol) -> Option<Value> {
        if let Storage::Dictionary(table) = &self.storage {
            if !table.contains_key(key) {
                return None;
            }
            self.dealias();
            let Storage::Dictionary(table) = &mut self.storage else {
                unreachable!("dealias keeps the regime");
            };
            return Arc::make_mut(table).remove(key);
        }

        let slot = self.shape.lookup(key)?;
        self.dealias();
        let len = self.shape.len();
        let next = shape_trie().without(&self.shape, slot);

        let removed = match &mut self.storage {
            Storage::Inline(slots) => {
                let removed = mem::take(&mut slots[slot]);
                slots[slot..len].rotate_left(1);
                removed
            }
            Storage::Packed(values) => Arc::make_mut(values).remove(slot),
            Storage::Dictionary(_) => unreachable!("dictionary handled above"),
        };

        if let Storage::Packed(values) = &mut self.storage {
            if values.len() <= INLINE_SLOTS {
                let mut slots: [Value; INLINE_SLOTS] = Default::default();
                for (target, value) in slots.iter_mut().zip(Arc::make_mut(values).drain(..)) {
                    *target = value;
                }
                self.storage = Storage::Inline(slots);
            }
        }

        self.shape = next;
        Some(removed)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl<F: KeyedFamily> Default for Keyed<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: KeyedFamily> Clone for Keyed<F> {
    /// Shares packed or dictionary storage, marking both sides aliased.
    fn clone(&self) -> Self {
        let (flags, storage) = match &self.storage {
            Storage::Inline(slots) => (self.flags.detached(), Storage::Inline(slots.clone())),
            Storage::Packed(values) => (self.flags.share(), Storage::Packed(Arc::clone(values))),
            Storage::Dictionary(table) => {
                (self.flags.share(), Storage::Dictionary(Arc::clone(table)))
            }
        };
        Self {
            flags,
            shape: Arc::clone(&self.shape),
            storage,
            family: PhantomData,
        }
    }
}

impl<F: KeyedFamily> PartialEq for Keyed<F> {
    /// Content equality; shape and regime are ignored.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key) == Some(value))
    }
}

impl<F: KeyedFamily> Eq for Keyed<F> {}

impl<F: KeyedFamily> Hash for Keyed<F> {
    /// Order-independent: the wrapping sum of per-entry hashes.
    fn hash<H: Hasher>(&self, state: &mut H) {
        let sum = self.iter().fold(0u64, |acc, entry| {
            let mut hasher = FxHasher::default();
            entry.hash(&mut hasher);
            acc.wrapping_add(hasher.finish())
        });
        state.write_usize(self.len());
        state.write_u64(sum);
    }
}

impl<F: KeyedFamily> fmt::Debug for Keyed<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<F: KeyedFamily> fmt::Display for Keyed<F> {
    /// Notation: `Object(x = 1, y = 2)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", F::NAME)?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key} = {value}")?;
        }
        f.write_str(")")
    }
}

impl<F: KeyedFamily> FromIterator<(Symbol, Value)> for Keyed<F> {
    fn from_iter<I: IntoIterator<Item = (Symbol, Value)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut keyed = Self::with_capacity(iter.size_hint().0);
        for (key, value) in iter {
            keyed.insert_field(key, value);
        }
        keyed
    }
}

impl<'a, F: KeyedFamily> IntoIterator for &'a Keyed<F> {
    type Item = (&'a Symbol, &'a Value);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Insertion-order iterator over a keyed container.
pub enum Iter<'a> {
    /// Inline or packed storage, zipped with the shape's fields.
    Shaped(Zip<slice::Iter<'a, Symbol>, slice::Iter<'a, Value>>),
    /// Dictionary storage.
    Dictionary(dict_table::Iter<'a>),
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Symbol, &'a Value);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Iter::Shaped(iter) => iter.next(),
            Iter::Dictionary(iter) => iter.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self {
            Iter::Shaped(iter) => iter.size_hint(),
            Iter::Dictionary(iter) => iter.size_hint(),
        }
    }
}

impl ExactSizeIterator for Iter<'_> {}

impl FusedIterator for Iter<'_> {}

// =============================================================================
// Tests
// =============================================================================
