//! Shape trie for keyed containers.
//!
//! A `Shape` describes which keys a keyed container holds and in which order,
//! so that the container itself only stores values. Containers that insert the
//! same keys in the same order converge on the same `Shape` object, no matter
//! which thread built them.
//!
//! # Architecture
//!
//! ```text
//!        root (size 0)
//!          |
//!      +---+---+
//!      |       |
//!     "x"     "y"
//!      |       |
//!   [x]      [y]
//!      |
//!     "y"
//!      |
//!   [x, y] ... up to packed_threshold keys, then the dictionary sentinel
//! ```
//!
//! ## Children
//!
//! Each node keeps an immutable ordered map from key to a *weak* child. Adding
//! a child builds a new map and publishes it with a compare-and-swap on the
//! node; a loser re-reads and either adopts the winner's child or retries.
//! Old maps are reclaimed through epoch-based deferral, so readers never take
//! a lock.
//!
//! ## Purging
//!
//! A child that no container references any more is dropped, leaving a dead
//! weak entry behind. Lookups opportunistically inspect one entry per purge
//! interval, rotating a cursor key through the map, and evict it if dead.
//!
//! ## Dictionary Sentinel
//!
//! Past `packed_threshold` keys, per-shape layout tracking stops: every
//! transition returns one shared sentinel and the container's hash table keeps
//! its own key bookkeeping.

use crate::config::{ConfigError, INLINE_SLOTS, RuntimeConfig};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};
use rustc_hash::FxHashMap;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Instant;
use tessel_core::Symbol;

// =============================================================================
// Shape ID
// =============================================================================

/// Unique identifier for a Shape within its trie.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ShapeId(pub u32);

impl ShapeId {
    /// The root shape ID (no keys).
    pub const EMPTY: Self = Self(0);

    /// The dictionary sentinel ID.
    pub const DICTIONARY: Self = Self(u32::MAX);

    /// Check if this is the root shape.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Get raw value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

// =============================================================================
// Shape
// =============================================================================

/// Size value carried by the dictionary sentinel.
pub const DICTIONARY_SIZE: u32 = u32::MAX;

/// Shapes up to this size resolve keys by walking the parent chain instead of
/// building a slot table.
const LINEAR_LOOKUP_LIMIT: usize = INLINE_SLOTS + 1;

/// Immutable published child map of one shape.
struct ChildTable {
    children: im::OrdMap<Symbol, Weak<Shape>>,
    /// Last key inspected by the purge.
    cursor: Option<Symbol>,
}

impl ChildTable {
    fn single(key: &Symbol, child: &Arc<Shape>) -> Self {
        Self {
            children: im::OrdMap::unit(key.clone(), Arc::downgrade(child)),
            cursor: None,
        }
    }

    fn with_child(&self, key: &Symbol, child: &Arc<Shape>) -> Self {
        Self {
            children: self.children.update(key.clone(), Arc::downgrade(child)),
            cursor: self.cursor.clone(),
        }
    }

    /// The entry after the cursor, wrapping around to the first entry.
    fn next_candidate(&self) -> Option<(&Symbol, &Weak<Shape>)> {
        let after = self.cursor.as_ref().and_then(|cursor| {
            self.children
                .range((Bound::Excluded(cursor.clone()), Bound::Unbounded))
                .next()
        });
        after.or_else(|| self.children.iter().next())
    }
}

/// A node of the shape trie.
///
/// Shapes are immutable once created. A shape keeps its parent alive; the
/// parent only holds weak references to its children.
pub struct Shape {
    /// Unique identifier for this shape.
    id: ShapeId,

    /// Number of keys from the root to this node, or `DICTIONARY_SIZE`.
    size: u32,

    /// Key added by this node. None for the root and the sentinel.
    key: Option<Symbol>,

    /// Parent shape. None for the root and the sentinel.
    parent: Option<Arc<Shape>>,

    /// All keys from the root to this node, in insertion order.
    fields: OnceLock<Box<[Symbol]>>,

    /// Key to slot index, for shapes too large for a chain walk.
    slots: OnceLock<FxHashMap<Symbol, u32>>,

    /// Published child map; null until the first child is created.
    children: Atomic<ChildTable>,

    /// Trie clock reading (ms) of the last purge step on this node.
    last_purge_ms: AtomicU64,
}

impl Shape {
    fn root() -> Self {
        Self::node(ShapeId::EMPTY, 0, None, None)
    }

    fn dictionary() -> Self {
        Self::node(ShapeId::DICTIONARY, DICTIONARY_SIZE, None, None)
    }

    fn node(id: ShapeId, size: u32, key: Option<Symbol>, parent: Option<Arc<Shape>>) -> Self {
        Self {
            id,
            size,
            key,
            parent,
            fields: OnceLock::new(),
            slots: OnceLock::new(),
            children: Atomic::null(),
            last_purge_ms: AtomicU64::new(0),
        }
    }

    /// Get the shape ID.
    #[inline]
    pub fn id(&self) -> ShapeId {
        self.id
    }

    /// Get the raw size, which is `DICTIONARY_SIZE` for the sentinel.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of keys described by this shape.
    ///
    /// Zero for the dictionary sentinel, which describes no layout; check
    /// `is_dictionary` first.
    #[inline]
    pub fn len(&self) -> usize {
        if self.is_dictionary() {
            0
        } else {
            self.size as usize
        }
    }

    /// Check if this is the root shape.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check if this is the dictionary sentinel.
    #[inline]
    pub fn is_dictionary(&self) -> bool {
        self.size == DICTIONARY_SIZE
    }

    /// Get the key introduced by this node.
    #[inline]
    pub fn key(&self) -> Option<&Symbol> {
        self.key.as_ref()
    }

    /// Get the parent shape.
    #[inline]
    pub fn parent(&self) -> Option<&Arc<Shape>> {
        self.parent.as_ref()
    }

    /// All keys from the root to this node, in insertion order.
    ///
    /// Built once from the parent's fields. Empty for the dictionary sentinel.
    pub fn fields(&self) -> &[Symbol] {
        if self.is_dictionary() {
            return &[];
        }
        self.fields.get_or_init(|| {
            let mut fields = Vec::with_capacity(self.size as usize);
            if let Some(parent) = &self.parent {
                fields.extend_from_slice(parent.fields());
            }
            if let Some(key) = &self.key {
                fields.push(key.clone());
            }
            fields.into_boxed_slice()
        })
    }

    /// Slot index of `key`, if this shape contains it.
    ///
    /// Always `None` on the dictionary sentinel.
    pub fn lookup(&self, key: &Symbol) -> Option<usize> {
        if self.is_dictionary() {
            return None;
        }
        if (self.size as usize) <= LINEAR_LOOKUP_LIMIT {
            let mut current = self;
            loop {
                if current.key.as_ref() == Some(key) {
                    return Some(current.size as usize - 1);
                }
                current = current.parent.as_deref()?;
            }
        }
        let slots = self.slots.get_or_init(|| {
            self.fields()
                .iter()
                .enumerate()
                .map(|(slot, key)| (key.clone(), slot as u32))
                .collect()
        });
        slots.get(key).map(|&slot| slot as usize)
    }

    /// Check if this shape contains `key`.
    #[inline]
    pub fn contains(&self, key: &Symbol) -> bool {
        self.lookup(key).is_some()
    }

    /// The ancestor of this shape with exactly `len` keys.
    pub fn ancestor(self: &Arc<Self>, len: usize) -> Arc<Shape> {
        let mut current = self;
        while current.len() > len {
            match &current.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Arc::clone(current)
    }

    /// Number of cached child entries, including collected ones not yet purged.
    pub fn transition_count(&self) -> usize {
        let guard = &epoch::pin();
        let table = self.children.load(Ordering::Acquire, guard);
        // SAFETY: tables are only reclaimed after being unlinked, and the
        // guard keeps this one alive until it is dropped.
        unsafe { table.as_ref() }.map_or(0, |table| table.children.len())
    }

    /// Number of cached children that are still alive.
    pub fn live_transition_count(&self) -> usize {
        let guard = &epoch::pin();
        let table = self.children.load(Ordering::Acquire, guard);
        // SAFETY: see `transition_count`.
        unsafe { table.as_ref() }.map_or(0, |table| {
            table
                .children
                .values()
                .filter(|child| child.strong_count() > 0)
                .count()
        })
    }

    /// Get a cached live child without creating one.
    pub fn get_transition(&self, key: &Symbol) -> Option<Arc<Shape>> {
        let guard = &epoch::pin();
        let table = self.children.load(Ordering::Acquire, guard);
        // SAFETY: see `transition_count`.
        unsafe { table.as_ref() }
            .and_then(|table| table.children.get(key))
            .and_then(Weak::upgrade)
    }
}

impl Drop for Shape {
    fn drop(&mut self) {
        // SAFETY: `&mut self` proves no other thread can reach this node, so
        // no guard can still be reading its current table.
        unsafe {
            let guard = epoch::unprotected();
            let table = self.children.load(Ordering::Relaxed, guard);
            if !table.is_null() {
                drop(table.into_owned());
            }
        }
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Shape {
    /// Notation: `Shape[x, y]`, or `Shape[dictionary]` for the sentinel.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dictionary() {
            return f.write_str("Shape[dictionary]");
        }
        f.write_str("Shape[")?;
        for (i, key) in self.fields().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}")?;
        }
        f.write_str("]")
    }
}

// =============================================================================
// Shape Trie
// =============================================================================

/// Owner of a root shape, the dictionary sentinel, and the trie settings.
///
/// Thread-safe: any number of threads may extend and read the trie at once.
pub struct ShapeTrie {
    config: RuntimeConfig,
    root: Arc<Shape>,
    dictionary: Arc<Shape>,
    /// Counter for generating unique shape IDs.
    next_id: AtomicU32,
    created: AtomicU64,
    purged: AtomicU64,
    /// Zero point of the purge clock.
    started: Instant,
}

impl ShapeTrie {
    /// Create a trie with the default configuration.
    pub fn new() -> Self {
        Self::from_valid(RuntimeConfig::default())
    }

    /// Create a trie with a custom configuration.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: RuntimeConfig) -> Self {
        Self {
            config,
            root: Arc::new(Shape::root()),
            dictionary: Arc::new(Shape::dictionary()),
            // ID 0 is reserved for the root
            next_id: AtomicU32::new(1),
            created: AtomicU64::new(0),
            purged: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    /// Get the trie configuration.
    #[inline]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Get the canonical empty shape.
    #[inline]
    pub fn root(&self) -> Arc<Shape> {
        Arc::clone(&self.root)
    }

    /// Get the dictionary sentinel.
    #[inline]
    pub fn dictionary(&self) -> Arc<Shape> {
        Arc::clone(&self.dictionary)
    }

    /// Check whether `shape` is this trie's root.
    #[inline]
    pub fn is_root(&self, shape: &Arc<Shape>) -> bool {
        Arc::ptr_eq(shape, &self.root)
    }

    /// The unique shape extending `node` with `key`.
    ///
    /// Returns the dictionary sentinel once `node` already holds
    /// `packed_threshold` keys. `key` must not already be in `node`.
    pub fn child_of(&self, node: &Arc<Shape>, key: &Symbol) -> Arc<Shape> {
        if node.is_dictionary() || node.len() >= self.config.packed_threshold {
            return self.dictionary();
        }
        debug_assert!(!node.contains(key), "key {key} already in {node}");

        let guard = &epoch::pin();
        self.purge_step(node, guard);

        let mut candidate: Option<Arc<Shape>> = None;
        loop {
            let current = node.children.load(Ordering::Acquire, guard);
            // SAFETY: see `Shape::transition_count`.
            let table = unsafe { current.as_ref() };
            if let Some(child) = table
                .and_then(|table| table.children.get(key))
                .and_then(Weak::upgrade)
            {
                return child;
            }

            let child = candidate
                .get_or_insert_with(|| self.new_child(node, key))
                .clone();
            let next = match table {
                Some(table) => table.with_child(key, &child),
                None => ChildTable::single(key, &child),
            };
            match node.children.compare_exchange(
                current,
                Owned::new(next),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            ) {
                Ok(_) => {
                    if !current.is_null() {
                        // SAFETY: `current` was just unlinked; readers that
                        // loaded it are covered by their own guards.
                        unsafe { guard.defer_destroy(current) };
                    }
                    self.created.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(id = child.id.raw(), size = child.size, key = %key, "created shape");
                    return child;
                }
                // Lost the race; re-read and adopt or retry.
                Err(_) => continue,
            }
        }
    }

    /// The shape reached from the root by appending `keys` in order.
    pub fn shape_of(&self, keys: &[Symbol]) -> Arc<Shape> {
        keys.iter()
            .fold(self.root(), |shape, key| self.child_of(&shape, key))
    }

    /// The shape of `node` with the key at `index` removed.
    ///
    /// Removing the last key yields the parent itself; removing an interior
    /// key re-appends the following keys onto the ancestor before it.
    pub fn without(&self, node: &Arc<Shape>, index: usize) -> Arc<Shape> {
        debug_assert!(!node.is_dictionary());
        let fields = node.fields();
        let mut shape = node.ancestor(index);
        for key in &fields[index + 1..] {
            shape = self.child_of(&shape, key);
        }
        shape
    }

    /// Get trie statistics.
    pub fn stats(&self) -> ShapeStats {
        ShapeStats {
            shapes_created: self.created.load(Ordering::Relaxed),
            shapes_purged: self.purged.load(Ordering::Relaxed),
            live_transitions: self.root.live_transition_count(),
        }
    }

    fn new_child(&self, node: &Arc<Shape>, key: &Symbol) -> Arc<Shape> {
        let id = ShapeId(self.next_id.fetch_add(1, Ordering::Relaxed));
        Arc::new(Shape::node(
            id,
            node.size + 1,
            Some(key.clone()),
            Some(Arc::clone(node)),
        ))
    }

    fn clock_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Inspect at most one child of `node`, evicting it if collected.
    ///
    /// Rate-limited per node; a lost race simply skips this round.
    fn purge_step(&self, node: &Shape, guard: &Guard) {
        let interval = u64::try_from(self.config.purge_interval.as_millis()).unwrap_or(u64::MAX);
        let now = self.clock_ms();
        let last = node.last_purge_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) < interval {
            return;
        }
        if node
            .last_purge_ms
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let current = node.children.load(Ordering::Acquire, guard);
        // SAFETY: see `Shape::transition_count`.
        let Some(table) = (unsafe { current.as_ref() }) else {
            return;
        };
        let Some((key, child)) = table.next_candidate() else {
            return;
        };
        let dead = child.strong_count() == 0;
        let next = ChildTable {
            children: if dead {
                table.children.without(key)
            } else {
                table.children.clone()
            },
            cursor: Some(key.clone()),
        };

        if node
            .children
            .compare_exchange(
                current,
                Owned::new(next),
                Ordering::AcqRel,
                Ordering::Acquire,
                guard,
            )
            .is_ok()
        {
            // SAFETY: see `child_of`.
            unsafe { guard.defer_destroy(current) };
            if dead {
                self.purged.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(parent = node.id.raw(), key = %key, "purged collected shape");
            }
        }
    }
}

impl Default for ShapeTrie {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ShapeTrie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShapeTrie")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Statistics about trie usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShapeStats {
    /// Shapes created, including ones later collected.
    pub shapes_created: u64,
    /// Dead child entries evicted by the purge.
    pub shapes_purged: u64,
    /// Live children currently cached on the root.
    pub live_transitions: usize,
}

// =============================================================================
// Global Trie Access
// =============================================================================

static SHAPE_TRIE: OnceLock<ShapeTrie> = OnceLock::new();

/// Get the global shape trie, building it from the environment on first use.
#[inline]
pub fn shape_trie() -> &'static ShapeTrie {
    SHAPE_TRIE.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        tracing::debug!(?config, "initialized global shape trie");
        ShapeTrie::from_valid(config)
    })
}

/// Build the global trie with an explicit configuration.
///
/// Succeeds if the trie is built by this call, or was already built with an
/// identical configuration.
pub fn init_shape_trie(config: RuntimeConfig) -> Result<&'static ShapeTrie, ConfigError> {
    config.validate()?;
    let mut installed = false;
    let trie = SHAPE_TRIE.get_or_init(|| {
        installed = true;
        tracing::debug!(?config, "initialized global shape trie");
        ShapeTrie::from_valid(config.clone())
    });
    if installed || trie.config == config {
        Ok(trie)
    } else {
        Err(ConfigError::AlreadyInitialized)
    }
}

// =============================================================================
// Tests
// =============================================================================
