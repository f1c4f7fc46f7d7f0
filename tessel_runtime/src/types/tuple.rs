//! Tuples with optionally named slots.
//!
//! Values are positional and follow the array copy-on-write rules. Slot names
//! live in a per-tuple `TupleShape` chain, not in the shared shape trie: each
//! node extends its parent by one slot, so dropping the last slot reverts to
//! the parent. A tuple without any names carries no shape at all.

use crate::object::flags::{ContainerFlags, FlagCell, copy_with_capacity};
use crate::value::Value;
use rustc_hash::{FxHashSet, FxHasher};
use smallvec::SmallVec;
use std::fmt;
use std::hash::{BuildHasherDefault, Hash, Hasher};
use std::sync::{Arc, OnceLock};
use tessel_core::error::{check_index, check_insert_index};
use tessel_core::{Symbol, TesselError, TesselResult};

const KIND: &str = "Tuple";

/// Name to position map, shared structurally along a shape chain.
type NameIndex = im::HashMap<Symbol, usize, BuildHasherDefault<FxHasher>>;

// =============================================================================
// Tuple Shape
// =============================================================================

/// Slot names of a tuple: one optional name per position.
///
/// A node records only the name of its own trailing slot. The flat list of
/// names is built on first use by walking the parent chain.
pub struct TupleShape {
    name: Option<Symbol>,
    arity: usize,
    named: usize,
    parent: Option<Arc<TupleShape>>,
    index: NameIndex,
    names: OnceLock<Box<[Option<Symbol>]>>,
}

impl TupleShape {
    /// The shape of the empty tuple.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            name: None,
            arity: 0,
            named: 0,
            parent: None,
            index: NameIndex::default(),
            names: OnceLock::new(),
        })
    }

    /// Build the chain for `names`, one node per slot.
    pub fn from_names<I>(names: I) -> Arc<Self>
    where
        I: IntoIterator<Item = Option<Symbol>>,
    {
        names
            .into_iter()
            .fold(Self::empty(), |shape, name| shape.extended(name))
    }

    /// This shape plus one trailing slot.
    pub fn extended(self: &Arc<Self>, name: Option<Symbol>) -> Arc<Self> {
        let mut index = self.index.clone();
        if let Some(name) = &name {
            index.insert(name.clone(), self.arity);
        }
        Arc::new(Self {
            named: self.named + usize::from(name.is_some()),
            name,
            arity: self.arity + 1,
            parent: Some(Arc::clone(self)),
            index,
            names: OnceLock::new(),
        })
    }

    /// Number of slots.
    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Number of named slots.
    #[inline]
    pub fn named_count(&self) -> usize {
        self.named
    }

    /// The shape with the last slot removed.
    #[inline]
    pub fn parent(&self) -> Option<&Arc<TupleShape>> {
        self.parent.as_ref()
    }

    /// Name of slot `index`, if it has one.
    pub fn name_at(&self, index: usize) -> Option<&Symbol> {
        if index + 1 == self.arity {
            return self.name.as_ref();
        }
        self.names().get(index).and_then(Option::as_ref)
    }

    /// Position of the slot called `name`.
    #[inline]
    pub fn index_of(&self, name: &Symbol) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// All slot names in position order.
    pub fn names(&self) -> &[Option<Symbol>] {
        self.names.get_or_init(|| {
            let mut names: SmallVec<[Option<Symbol>; 4]> = SmallVec::with_capacity(self.arity);
            let mut node = self;
            while let Some(parent) = &node.parent {
                names.push(node.name.clone());
                node = parent;
            }
            names.reverse();
            names.into_vec().into_boxed_slice()
        })
    }

    /// Names held by every node of the chain, without building any list.
    #[cfg(test)]
    fn retained_names(&self) -> usize {
        let mut total = 0;
        let mut node = Some(self);
        while let Some(current) = node {
            total += usize::from(current.name.is_some());
            total += current.names.get().map_or(0, |names| names.len());
            node = current.parent.as_deref();
        }
        total
    }
}

impl fmt::Debug for TupleShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TupleShape")
            .field("arity", &self.arity())
            .field("named", &self.named)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TupleShape {
    /// Notation: `TupleShape[_, name]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TupleShape[")?;
        for (i, name) in self.names().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match name {
                Some(name) => write!(f, "{name}")?,
                None => f.write_str("_")?,
            }
        }
        f.write_str("]")
    }
}

// =============================================================================
// Tuple Value
// =============================================================================

/// Positional container whose slots may carry names.
pub struct TupleValue {
    flags: FlagCell,
    items: Arc<Vec<Value>>,
    /// None while no slot is named.
    shape: Option<Arc<TupleShape>>,
}

impl TupleValue {
    /// Create an empty tuple.
    #[inline]
    pub fn new() -> Self {
        Self::from_values(Vec::new())
    }

    /// Create a purely positional tuple.
    #[inline]
    pub fn from_values(items: Vec<Value>) -> Self {
        Self {
            flags: FlagCell::default(),
            items: Arc::new(items),
            shape: None,
        }
    }

    /// Create a tuple from optionally named entries.
    ///
    /// Fails if a name appears twice.
    pub fn from_entries<I>(entries: I) -> TesselResult<Self>
    where
        I: IntoIterator<Item = (Option<Symbol>, Value)>,
    {
        let mut names = Vec::new();
        let mut items = Vec::new();
        let mut seen = FxHashSet::default();
        for (name, value) in entries {
            if let Some(name) = &name {
                if !seen.insert(name.clone()) {
                    return Err(duplicate_name(name));
                }
            }
            names.push(name);
            items.push(value);
        }
        let shape = (!seen.is_empty()).then(|| TupleShape::from_names(names));
        Ok(Self {
            flags: FlagCell::default(),
            items: Arc::new(items),
            shape,
        })
    }

    fn derived(&self, items: Vec<Value>, shape: Option<Arc<TupleShape>>) -> Self {
        Self {
            flags: self.flags.detached(),
            items: Arc::new(items),
            shape: normalize(shape),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Check if the tuple has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Get the value in slot `index`.
    #[inline]
    pub fn get(&self, index: usize) -> TesselResult<&Value> {
        self.items
            .get(index)
            .ok_or_else(|| TesselError::out_of_bounds(index, self.len()))
    }

    /// Get the value in the slot called `name`.
    pub fn get_by_name(&self, name: &Symbol) -> Option<&Value> {
        self.index_of(name).map(|index| &self.items[index])
    }

    /// Position of the slot called `name`.
    pub fn index_of(&self, name: &Symbol) -> Option<usize> {
        self.shape.as_ref().and_then(|shape| shape.index_of(name))
    }

    /// Name of slot `index`, if it has one.
    pub fn name_at(&self, index: usize) -> Option<&Symbol> {
        self.shape.as_ref().and_then(|shape| shape.name_at(index))
    }

    /// The slot-name shape; None for a purely positional tuple.
    #[inline]
    pub fn shape(&self) -> Option<&Arc<TupleShape>> {
        self.shape.as_ref()
    }

    /// Check that no slot is named.
    #[inline]
    pub fn is_positional(&self) -> bool {
        self.named_count() == 0
    }

    /// Number of named slots.
    #[inline]
    pub fn named_count(&self) -> usize {
        self.shape.as_ref().map_or(0, |shape| shape.named_count())
    }

    /// Get the underlying slice.
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.items
    }

    /// Iterate over values.
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }

    /// Iterate over `(name, value)` pairs in position order.
    pub fn entries(&self) -> impl Iterator<Item = (Option<&Symbol>, &Value)> + '_ {
        self.items
            .iter()
            .enumerate()
            .map(|(i, value)| (self.name_at(i), value))
    }

    /// Check if any slot holds `value`.
    pub fn contains(&self, value: &Value) -> bool {
        self.items.contains(value)
    }

    /// Check whether storage may be shared with another instance.
    #[inline]
    pub fn is_aliased(&self) -> bool {
        self.flags.is_aliased()
    }

    /// Check whether the tuple is committed.
    #[inline]
    pub fn is_committed(&self) -> bool {
        self.flags.is_frozen()
    }

    // =========================================================================
    // In-place Mutation
    // =========================================================================

    /// Replace the value in slot `index`, returning the old one.
    pub fn set(&mut self, index: usize, value: Value) -> TesselResult<Value> {
        self.check_mutable()?;
        check_index(index, self.len())?;
        Ok(std::mem::replace(&mut self.items_mut(0)[index], value))
    }

    /// Replace the value in the slot called `name`.
    pub fn set_by_name(&mut self, name: &Symbol, value: Value) -> TesselResult<Value> {
        self.check_mutable()?;
        let index = self
            .index_of(name)
            .ok_or_else(|| TesselError::invalid_argument(format!("no slot named {name}")))?;
        Ok(std::mem::replace(&mut self.items_mut(0)[index], value))
    }

    /// Give slot `index` a name.
    ///
    /// Fails if the slot is already named or the name is taken.
    pub fn set_name(&mut self, index: usize, name: Symbol) -> TesselResult<()> {
        self.check_mutable()?;
        check_index(index, self.len())?;
        if let Some(existing) = self.name_at(index) {
            return Err(TesselError::invalid_argument(format!(
                "slot {index} is already named {existing}"
            )));
        }
        if self.index_of(&name).is_some() {
            return Err(duplicate_name(&name));
        }
        let mut names = self.slot_names();
        names[index] = Some(name);
        self.shape = Some(TupleShape::from_names(names));
        Ok(())
    }

    /// Append an unnamed slot.
    pub fn add(&mut self, value: Value) -> TesselResult<()> {
        self.check_mutable()?;
        self.items_mut(1).push(value);
        if let Some(shape) = &self.shape {
            self.shape = Some(shape.extended(None));
        }
        Ok(())
    }

    /// Append a slot called `name`.
    pub fn add_named(&mut self, name: Symbol, value: Value) -> TesselResult<()> {
        self.check_mutable()?;
        if self.index_of(&name).is_some() {
            return Err(duplicate_name(&name));
        }
        let shape = self.shape_or_positional().extended(Some(name));
        self.items_mut(1).push(value);
        self.shape = Some(shape);
        Ok(())
    }

    /// Insert an unnamed slot at `index`.
    pub fn insert(&mut self, index: usize, value: Value) -> TesselResult<()> {
        self.check_mutable()?;
        check_insert_index(index, self.len())?;
        self.items_mut(1).insert(index, value);
        if self.shape.is_some() {
            let mut names = self.slot_names();
            names.insert(index, None);
            self.shape = normalize(Some(TupleShape::from_names(names)));
        }
        Ok(())
    }

    /// Remove slot `index`, shifting later slots left.
    ///
    /// Removing the last slot reverts the shape to its parent.
    pub fn remove(&mut self, index: usize) -> TesselResult<Value> {
        self.check_mutable()?;
        check_index(index, self.len())?;
        let removed = self.items_mut(0).remove(index);
        self.shape = self.shape_without(index);
        Ok(removed)
    }

    /// Append every value as an unnamed slot.
    pub fn add_all<I>(&mut self, values: I) -> TesselResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        self.check_mutable()?;
        let start = self.len();
        let values = values.into_iter();
        self.items_mut(values.size_hint().0).extend(values);
        if let Some(shape) = &self.shape {
            let added = self.len() - start;
            self.shape = Some((0..added).fold(Arc::clone(shape), |s, _| s.extended(None)));
        }
        Ok(())
    }

    /// Remove every slot whose value appears in `values`.
    pub fn remove_all<'a, I>(&mut self, values: I) -> TesselResult<bool>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.check_mutable()?;
        let set: FxHashSet<&Value> = values.into_iter().collect();
        Ok(self.retain_where(|v| !set.contains(v)))
    }

    /// Keep only slots whose value appears in `values`.
    pub fn retain_all<'a, I>(&mut self, values: I) -> TesselResult<bool>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        self.check_mutable()?;
        let set: FxHashSet<&Value> = values.into_iter().collect();
        Ok(self.retain_where(|v| set.contains(v)))
    }

    /// Remove every slot.
    pub fn clear(&mut self) -> TesselResult<()> {
        self.check_mutable()?;
        self.items = Arc::new(Vec::new());
        self.shape = None;
        self.flags.remove(ContainerFlags::ALIASED);
        Ok(())
    }

    // =========================================================================
    // Persistent API
    // =========================================================================

    /// A new tuple with an unnamed slot appended.
    #[must_use]
    pub fn appended(&self, value: Value) -> Self {
        let mut items = copy_with_capacity(&self.items, self.len() + 1);
        items.push(value);
        let shape = self.shape.as_ref().map(|shape| shape.extended(None));
        self.derived(items, shape)
    }

    /// A new tuple with a slot called `name` appended.
    pub fn appended_named(&self, name: Symbol, value: Value) -> TesselResult<Self> {
        if self.index_of(&name).is_some() {
            return Err(duplicate_name(&name));
        }
        let mut items = copy_with_capacity(&self.items, self.len() + 1);
        items.push(value);
        let shape = self.shape_or_positional().extended(Some(name));
        Ok(self.derived(items, Some(shape)))
    }

    /// A new tuple with slot `index` replaced.
    pub fn set_at(&self, index: usize, value: Value) -> TesselResult<Self> {
        check_index(index, self.len())?;
        let mut items = self.items.as_ref().clone();
        items[index] = value;
        Ok(self.derived(items, self.shape.clone()))
    }

    /// A new tuple without slot `index`.
    pub fn removed(&self, index: usize) -> TesselResult<Self> {
        check_index(index, self.len())?;
        let mut items = Vec::with_capacity(self.len() - 1);
        items.extend_from_slice(&self.items[..index]);
        items.extend_from_slice(&self.items[index + 1..]);
        Ok(self.derived(items, self.shape_without(index)))
    }

    /// A new tuple holding slots `from..to`, names included.
    pub fn subrange(&self, from: usize, to: usize) -> TesselResult<Self> {
        if from > to {
            return Err(TesselError::invalid_argument(format!(
                "subrange start {from} is after end {to}"
            )));
        }
        if to > self.len() {
            return Err(TesselError::out_of_bounds(to, self.len()));
        }
        let shape = self
            .shape
            .as_ref()
            .map(|shape| TupleShape::from_names(shape.names()[from..to].iter().cloned()));
        Ok(self.derived(self.items[from..to].to_vec(), shape))
    }

    // =========================================================================
    // Commit and Copies
    // =========================================================================

    /// Freeze this tuple and every value reachable from it.
    pub fn commit(&self) {
        self.flags.insert(ContainerFlags::FROZEN);
        for value in self.items.iter() {
            value.commit();
        }
    }

    /// A mutable tuple with the same slots, sharing storage.
    #[must_use]
    pub fn mutable_copy(&self) -> Self {
        self.flags.insert(ContainerFlags::ALIASED);
        Self {
            flags: FlagCell::new(ContainerFlags::ALIASED),
            items: Arc::clone(&self.items),
            shape: self.shape.clone(),
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

    fn items_mut(&mut self, extra: usize) -> &mut Vec<Value> {
        if self.flags.take_aliased() {
            self.items = Arc::new(copy_with_capacity(&self.items, self.items.len() + extra));
        }
        Arc::make_mut(&mut self.items)
    }

    /// Current shape, or an all-unnamed one matching the arity.
    fn shape_or_positional(&self) -> Arc<TupleShape> {
        match &self.shape {
            Some(shape) => Arc::clone(shape),
            None => TupleShape::from_names(std::iter::repeat(None).take(self.len())),
        }
    }

    fn slot_names(&self) -> Vec<Option<Symbol>> {
        match &self.shape {
            Some(shape) => shape.names().to_vec(),
            None => vec![None; self.len()],
        }
    }

    /// Shape after removing slot `index` from a tuple of the current arity.
    fn shape_without(&self, index: usize) -> Option<Arc<TupleShape>> {
        let shape = self.shape.as_ref()?;
        if index + 1 == shape.arity() {
            return normalize(shape.parent().cloned());
        }
        let names = shape
            .names()
            .iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, name)| name.clone());
        normalize(Some(TupleShape::from_names(names)))
    }

    fn retain_where(&mut self, keep: impl Fn(&Value) -> bool) -> bool {
        if self.items.iter().all(&keep) {
            return false;
        }
        let names = self.slot_names();
        let (items, names): (Vec<Value>, Vec<Option<Symbol>>) = self
            .items
            .iter()
            .zip(names)
            .filter(|(value, _)| keep(*value))
            .map(|(value, name)| (value.clone(), name))
            .unzip();

        self.items = Arc::new(items);
        self.flags.remove(ContainerFlags::ALIASED);
        self.shape = normalize(Some(TupleShape::from_names(names)));
        true
    }
}

/// Drop a shape that names nothing.
fn normalize(shape: Option<Arc<TupleShape>>) -> Option<Arc<TupleShape>> {
    shape.filter(|shape| shape.named_count() > 0)
}

fn duplicate_name(name: &Symbol) -> TesselError {
    TesselError::invalid_argument(format!("duplicate tuple slot name {name}"))
}

// =============================================================================
// Trait Implementations
// =============================================================================

impl Default for TupleValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TupleValue {
    /// Shares storage, marking both sides aliased.
    fn clone(&self) -> Self {
        Self {
            flags: self.flags.share(),
            items: Arc::clone(&self.items),
            shape: self.shape.clone(),
        }
    }
}

impl PartialEq for TupleValue {
    /// Values and slot names must match position by position.
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
            && self.named_count() == other.named_count()
            && (0..self.len()).all(|i| self.name_at(i) == other.name_at(i))
    }
}

impl Eq for TupleValue {}

impl Hash for TupleValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (name, value) in self.entries() {
            name.hash(state);
            value.hash(state);
        }
        state.write_usize(self.len());
    }
}

impl fmt::Debug for TupleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.entries()).finish()
    }
}

impl fmt::Display for TupleValue {
    /// Notation: `Tuple(1, b = 2)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Tuple(")?;
        for (i, (name, value)) in self.entries().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match name {
                Some(name) => write!(f, "{name} = {value}")?,
                None => write!(f, "{value}")?,
            }
        }
        f.write_str(")")
    }
}

impl FromIterator<Value> for TupleValue {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::intern;

    fn named(entries: &[(Option<&str>, i64)]) -> TupleValue {
        TupleValue::from_entries(
            entries
                .iter()
                .map(|&(name, v)| (name.map(intern), Value::Int(v))),
        )
        .unwrap()
    }

    // -------------------------------------------------------------------------
    // Tuple Shape
    // -------------------------------------------------------------------------

    #[test]
    fn test_shape_chain() {
        let shape = TupleShape::from_names([None, Some(intern("b")), Some(intern("c"))]);
        assert_eq!(shape.arity(), 3);
        assert_eq!(shape.named_count(), 2);
        assert_eq!(shape.index_of(&intern("c")), Some(2));
        assert_eq!(shape.name_at(0), None);

        let parent = shape.parent().unwrap();
        assert_eq!(parent.arity(), 2);
        assert_eq!(parent.index_of(&intern("c")), None);
        assert_eq!(shape.to_string(), "TupleShape[_, b, c]");
    }

    #[test]
    fn test_shape_index_on_long_chain() {
        let names: Vec<String> = (0..10).map(|i| format!("slot{i}")).collect();
        let shape = TupleShape::from_names(names.iter().map(|n| Some(intern(n))));
        for (i, name) in names.iter().enumerate() {
            assert_eq!(shape.index_of(&intern(name)), Some(i));
        }
        assert_eq!(shape.index_of(&intern("slot10")), None);

        // Ancestors never see names added after them.
        let parent = shape.parent().unwrap();
        assert_eq!(parent.index_of(&intern("slot9")), None);
        assert_eq!(parent.index_of(&intern("slot8")), Some(8));
    }

    #[test]
    fn test_named_growth_retains_linear_names() {
        let count = 2000;
        let mut tuple = TupleValue::new();
        for i in 0..count {
            tuple
                .add_named(intern(&format!("grow{i}")), Value::Int(i as i64))
                .unwrap();
        }

        let shape = tuple.shape().unwrap();
        assert_eq!(shape.retained_names(), count);
        assert_eq!(tuple.get_by_name(&intern("grow1234")), Some(&Value::Int(1234)));

        // Materializing the tip list adds one copy, not one per node.
        assert_eq!(tuple.name_at(7).unwrap().as_str(), "grow7");
        assert_eq!(shape.names().len(), count);
        assert!(shape.retained_names() <= 2 * count + 1);
    }

    #[test]
    fn test_shape_names_skip_unnamed() {
        let shape = TupleShape::from_names([Some(intern("a")), None, None]);
        assert_eq!(shape.name_at(2), None);
        assert_eq!(shape.names(), &[Some(intern("a")), None, None]);
        assert_eq!(shape.retained_names(), 1 + 3);
    }

    // -------------------------------------------------------------------------
    // Positional Behavior
    // -------------------------------------------------------------------------

    #[test]
    fn test_positional_tuple() {
        let mut tuple: TupleValue = [Value::Int(1), Value::Int(2)].into_iter().collect();
        assert!(tuple.is_positional());
        assert!(tuple.shape().is_none());

        tuple.add(Value::Int(3)).unwrap();
        tuple.insert(0, Value::Int(0)).unwrap();
        assert_eq!(tuple.remove(1).unwrap(), Value::Int(1));
        assert_eq!(tuple.as_slice(), &[Value::Int(0), Value::Int(2), Value::Int(3)]);
        assert!(tuple.get(3).is_err());
    }

    // -------------------------------------------------------------------------
    // Named Slots
    // -------------------------------------------------------------------------

    #[test]
    fn test_get_by_name() {
        let tuple = named(&[(None, 1), (Some("b"), 2), (Some("c"), 3)]);
        assert_eq!(tuple.get_by_name(&intern("b")), Some(&Value::Int(2)));
        assert_eq!(tuple.index_of(&intern("c")), Some(2));
        assert_eq!(tuple.name_at(1).unwrap().as_str(), "b");
        assert_eq!(tuple.named_count(), 2);
        assert!(!tuple.is_positional());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = TupleValue::from_entries([
            (Some(intern("a")), Value::Int(1)),
            (Some(intern("a")), Value::Int(2)),
        ]);
        assert_eq!(result.unwrap_err().category(), "InvalidArgument");

        let mut tuple = named(&[(Some("a"), 1)]);
        assert!(tuple.add_named(intern("a"), Value::Int(2)).is_err());
        assert!(tuple.appended_named(intern("a"), Value::Int(2)).is_err());
    }

    #[test]
    fn test_add_named_to_positional() {
        let mut tuple: TupleValue = [Value::Int(1)].into_iter().collect();
        tuple.add_named(intern("n"), Value::Int(2)).unwrap();
        assert_eq!(tuple.index_of(&intern("n")), Some(1));
        assert_eq!(tuple.name_at(0), None);
    }

    #[test]
    fn test_set_by_name() {
        let mut tuple = named(&[(Some("a"), 1)]);
        assert_eq!(tuple.set_by_name(&intern("a"), Value::Int(5)).unwrap(), Value::Int(1));
        assert_eq!(tuple.get(0).unwrap(), &Value::Int(5));
        assert!(tuple.set_by_name(&intern("zz"), Value::Nothing).is_err());
    }

    #[test]
    fn test_set_name() {
        let mut tuple: TupleValue = [Value::Int(1), Value::Int(2)].into_iter().collect();
        tuple.set_name(1, intern("second")).unwrap();
        assert_eq!(tuple.get_by_name(&intern("second")), Some(&Value::Int(2)));

        assert!(tuple.set_name(1, intern("other")).is_err());
        assert!(tuple.set_name(0, intern("second")).is_err());
    }

    #[test]
    fn test_remove_last_reverts_to_parent() {
        let mut tuple = named(&[(Some("a"), 1), (Some("b"), 2)]);
        let parent = Arc::clone(tuple.shape().unwrap().parent().unwrap());

        tuple.remove(1).unwrap();
        assert!(Arc::ptr_eq(tuple.shape().unwrap(), &parent));
        assert!(tuple.get_by_name(&intern("b")).is_none());
    }

    #[test]
    fn test_remove_interior_shifts_names() {
        let mut tuple = named(&[(Some("a"), 1), (None, 2), (Some("c"), 3)]);
        tuple.remove(0).unwrap();
        assert_eq!(tuple.index_of(&intern("c")), Some(1));
        assert_eq!(tuple.named_count(), 1);
    }

    #[test]
    fn test_removing_only_name_becomes_positional() {
        let mut tuple = named(&[(None, 1), (Some("b"), 2)]);
        tuple.remove(1).unwrap();
        assert!(tuple.is_positional());
        assert!(tuple.shape().is_none());
    }

    #[test]
    fn test_insert_shifts_names() {
        let mut tuple = named(&[(Some("a"), 1)]);
        tuple.insert(0, Value::Int(0)).unwrap();
        assert_eq!(tuple.index_of(&intern("a")), Some(1));
    }

    // -------------------------------------------------------------------------
    // Bulk Operations
    // -------------------------------------------------------------------------

    #[test]
    fn test_remove_all_keeps_names_aligned() {
        let mut tuple = named(&[(Some("a"), 1), (Some("b"), 2), (Some("c"), 1)]);
        assert!(tuple.remove_all(&[Value::Int(1)]).unwrap());
        assert_eq!(tuple.len(), 1);
        assert_eq!(tuple.name_at(0).unwrap().as_str(), "b");
    }

    #[test]
    fn test_retain_all_and_add_all() {
        let mut tuple = named(&[(Some("a"), 1), (None, 2)]);
        tuple.add_all([Value::Int(3)]).unwrap();
        assert_eq!(tuple.len(), 3);
        assert_eq!(tuple.shape().unwrap().arity(), 3);

        assert!(tuple.retain_all(&[Value::Int(1), Value::Int(3)]).unwrap());
        assert_eq!(tuple.as_slice(), &[Value::Int(1), Value::Int(3)]);
        assert_eq!(tuple.index_of(&intern("a")), Some(0));
    }

    // -------------------------------------------------------------------------
    // Persistent API
    // -------------------------------------------------------------------------

    #[test]
    fn test_persistent_operations_leave_receiver() {
        let tuple = named(&[(Some("a"), 1), (None, 2)]);

        let appended = tuple.appended_named(intern("z"), Value::Int(3)).unwrap();
        assert_eq!(appended.index_of(&intern("z")), Some(2));

        let removed = tuple.removed(0).unwrap();
        assert!(removed.is_positional());
        assert_eq!(removed.as_slice(), &[Value::Int(2)]);

        let replaced = tuple.set_at(1, Value::Int(9)).unwrap();
        assert_eq!(replaced.get(1).unwrap(), &Value::Int(9));

        assert_eq!(tuple, named(&[(Some("a"), 1), (None, 2)]));
    }

    #[test]
    fn test_subrange_keeps_names() {
        let tuple = named(&[(Some("a"), 1), (Some("b"), 2), (None, 3)]);
        let sub = tuple.subrange(1, 3).unwrap();
        assert_eq!(sub.index_of(&intern("b")), Some(0));
        assert!(tuple.subrange(2, 1).is_err());
        assert!(tuple.subrange(0, 4).is_err());
    }

    // -------------------------------------------------------------------------
    // Copy-on-Write, Equality, Notation
    // -------------------------------------------------------------------------

    #[test]
    fn test_clone_isolation() {
        let a = named(&[(Some("a"), 1)]);
        let mut b = a.clone();
        b.set(0, Value::Int(2)).unwrap();
        assert_eq!(a.get(0).unwrap(), &Value::Int(1));
    }

    #[test]
    fn test_commit() {
        let mut tuple = named(&[(Some("a"), 1)]);
        tuple.commit();
        assert_eq!(
            tuple.add(Value::Nothing).unwrap_err(),
            TesselError::immutable("Tuple")
        );
        assert!(tuple.appended(Value::Nothing).is_committed());
        assert!(!tuple.mutable_copy().is_committed());
    }

    #[test]
    fn test_equality_includes_names() {
        let a = named(&[(Some("a"), 1)]);
        let b = named(&[(Some("b"), 1)]);
        let c: TupleValue = [Value::Int(1)].into_iter().collect();
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(c, named(&[(None, 1)]));
    }

    #[test]
    fn test_display() {
        let tuple = named(&[(None, 1), (Some("b"), 2)]);
        assert_eq!(tuple.to_string(), "Tuple(1, b = 2)");
    }
}
