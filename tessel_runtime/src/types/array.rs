//! Resizable array.
//!
//! Same copy-on-write discipline as packed keyed storage: clones share the
//! backing vector and mark both sides aliased; the next in-place write on an
//! aliased instance copies first.

use crate::object::flags::{ContainerFlags, FlagCell, copy_with_capacity};
use crate::value::Value;
use rustc_hash::FxHashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tessel_core::error::{check_index, check_insert_index};
use tessel_core::{TesselError, TesselResult};

const KIND: &str = "Array";

/// Ordered list of values.
pub struct ArrayValue {
    flags: FlagCell,
    items: Arc<Vec<Value>>,
}

impl ArrayValue {
    /// Create an empty array.
    #[inline]
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    /// Create an empty array with room for `capacity` items.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_values(Vec::with_capacity(capacity))
    }

    /// Create an array owning `items`.
    #[inline]
    pub fn from_values(items: Vec<Value>) -> Self {
        Self {
            flags: FlagCell::default(),
            items: Arc::new(items),
        }
    }

    fn derived(&self, items: Vec<Value>) -> Self {
        Self {
            flags: self.flags.detached(),
            items: Arc::new(items),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the array is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the item at `index`.
    #[inline]
    pub fn get(&self, index: usize) -> TesselResult<&Value> {
        self.items
            .get(index)
            .ok_or_else(|| TesselError::out_of_bounds(index, self.len()))
    }

    /// Get the underlying slice.
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    /// Iterate over items.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Check if the array holds `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// Index of the first item equal to `value`.
    pub fn index_of_value(&self, value: &Value) -> Option<usize> {
        self.items.iter().position(|v| v == value)
    }

    /// Check whether storage may be shared with another instance.
    #[inline]
    pub fn is_aliased(&self) -> bool {
        self.flags.is_aliased()
    }

    /// Check whether the array is committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.flags.is_frozen()
    }

    // =========================================================================
    // In-place Mutation
    // =========================================================================

    /// Replace the item at `index`, returning the old one.
    pub fn set(&mut self, index: usize, value: Value) -> TesselResult<Value> {
        self.check_mutable()?;
        check_index(index, self.len())?;
        Ok(std::mem::replace(&mut self.items_mut(0)[index], value))
    }

    /// Append `value`.
    pub fn add(&mut self, value: Value) -> TesselResult<()> {
        self.check_mutable()?;
        self.items_mut(1).push(value);
        Ok(())
    }

    /// Insert `value` at `index`, shifting later items right.
    pub fn insert(&mut self, index: usize, value: Value) -> TesselResult<()> {
        self.check_mutable()?;
        check_insert_index(index, self.len())?;
        self.items_mut(1).insert(index, value);
        Ok(())
    }

    /// Remove the item at `index`, shifting later items left.
    pub fn remove(&mut self, index: usize) -> TesselResult<Value> {
        self.check_mutable()?;
        check_index(index, self.len())?;
        Ok(self.items_mut(0).remove(index))
    }

    /// Append every item of `values`.
    pub fn add_all<I>(&mut self, values: I) -> TesselResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        self.check_mutable()?;
        let values = values.into_iter();
        self.items_mut(values.size_hint().0).extend(values);
        Ok(())
    }

    /// Remove every item that appears in `values`. Returns whether any was removed.
    pub fn remove_all<'a, I>(&mut self, values: I) -> TesselResult<bool>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.check_mutable()?;
        let set: FxHashSet<&Value> = values.into_iter().collect();
        Ok(self.retain_where(|v| !set.contains(v)))
    }

    /// Keep only items that appear in `values`. Returns whether any was removed.
    pub fn retain_all<'a, I>(&mut self, values: I) -> TesselResult<bool>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.check_mutable()?;
        let set: FxHashSet<&Value> = values.into_iter().collect();
        Ok(self.retain_where(|v| set.contains(v)))
    }

    /// Remove every item.
    pub fn clear(&mut self) -> TesselResult<()> {
        self.check_mutable()?;
        self.items = Arc::new(Vec::new());
        self.flags.remove(ContainerFlags::ALIASED);
        Ok(())
    }

    // =========================================================================
    // Persistent API
    // =========================================================================

    /// A new array with `value` appended. The receiver is unchanged.
    #[must_use]
    pub fn appended(&self, value: Value) -> Self {
        let mut items = copy_with_capacity(&self.items, self.len() + 1);
        items.push(value);
        self.derived(items)
    }

    /// A new array with `value` inserted at `index`.
    pub fn inserted(&self, index: usize, value: Value) -> TesselResult<Self> {
        check_insert_index(index, self.len())?;
        let mut items = Vec::with_capacity(self.len() + 1);
        items.extend_from_slice(&self.items[..index]);
        items.push(value);
        items.extend_from_slice(&self.items[index..]);
        Ok(self.derived(items))
    }

    /// A new array with the item at `index` replaced.
    pub fn set_at(&self, index: usize, value: Value) -> TesselResult<Self> {
        check_index(index, self.len())?;
        let mut items = self.items.as_ref().clone();
        items[index] = value;
        Ok(self.derived(items))
    }

    /// A new array without the item at `index`.
    pub fn removed(&self, index: usize) -> TesselResult<Self> {
        check_index(index, self.len())?;
        let mut items = Vec::with_capacity(self.len() - 1);
        items.extend_from_slice(&self.items[..index]);
        items.extend_from_slice(&self.items[index + 1..]);
        Ok(self.derived(items))
    }

    /// A new array holding items `from..to`.
    pub fn subrange(&self, from: usize, to: usize) -> TesselResult<Self> {
        if from > to {
            return Err(TesselError::invalid_argument(format!(
                "subrange start {from} is after end {to}"
            )));
        }
        if to > self.len() {
            return Err(TesselError::out_of_bounds(to, self.len()));
        }
        Ok(self.derived(self.items[from..to].to_vec()))
    }

    /// A new array with the items in reverse order.
    #[must_use]
    pub fn reversed(&self) -> Self {
        self.derived(self.items.iter().rev().cloned().collect())
    }

    // =========================================================================
    // Commit and Copies
    // =========================================================================

    /// Freeze this array and every value reachable from it.
    pub fn commit(&self) {
        self.flags.insert(ContainerFlags::FROZEN);
        for value in self.items.iter() {
            value.commit();
        }
    }

    /// A mutable array with the same items, sharing storage.
    #[must_use]
    pub fn mutable_copy(&self) -> Self {
        self.flags.insert(ContainerFlags::ALIASED);
        Self {
            flags: FlagCell::new(ContainerFlags::ALIASED),
            items: Arc::clone(&self.items),
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn check_mutable(&self) -> TesselResult<()> {
        if self.flags.is_frozen() {
            return Err(TesselError::immutable(KIND));
        }
        Ok(())
    }

    /// Exclusive access to the items, copying first if aliased.
    fn items_mut(&mut self, extra: usize) -> &mut Vec<Value> {
        if self.flags.take_aliased() {
            self.items = Arc::new(copy_with_capacity(&self.items, self.items.len() + extra));
        }
        Arc::make_mut(&mut self.items)
    }

    fn retain_where(&mut self, keep: impl Fn(&Value) -> bool) -> bool {
        if self.items.iter().all(&keep) {
            return false;
        }
        self.items_mut(0).retain(|v| keep(v));
        true
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl Default for ArrayValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ArrayValue {
    /// Shares storage, marking both sides aliased.
    fn clone(&self) -> Self {
        Self {
            flags: self.flags.share(),
            items: Arc::clone(&self.items),
        }
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.items, &other.items) || self.items == other.items
    }
}

impl Eq for ArrayValue {}

impl Hash for ArrayValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.items.as_slice().hash(state);
    }
}

impl fmt::Debug for ArrayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

impl fmt::Display for ArrayValue {
    /// Notation: `Array(1, 2, 3)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Array(")?;
        for (i, value) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str(")")
    }
}

impl FromIterator<Value> for ArrayValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}

impl From<Vec<Value>> for ArrayValue {
    fn from(items: Vec<Value>) -> Self {
        Self::from_values(items)
    }
}

impl<'a> IntoIterator for &'a ArrayValue {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
