//! Per-instance container flags.
//!
//! Both flags live in one atomic byte so that cloning through `&self` can mark
//! the source instance as aliased, and committing through `&self` can freeze a
//! value that is reachable only by shared reference.

use crate::value::Value;
use bitflags::bitflags;
use std::sync::atomic::{AtomicU8, Ordering};

bitflags! {
    /// Container state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContainerFlags: u8 {
        /// The instance is committed; in-place mutation is rejected.
        const FROZEN = 1 << 0;
        /// Backing storage may be shared; copy before the next in-place write.
        const ALIASED = 1 << 1;
    }
}

/// Atomic holder for `ContainerFlags`.
///
/// Relaxed ordering is sufficient: the flags only order operations on a single
/// instance, and instances are not shared mutably across threads.
#[derive(Debug, Default)]
pub struct FlagCell(AtomicU8);

impl FlagCell {
    /// Create a cell holding `flags`.
    #[inline]
    pub fn new(flags: ContainerFlags) -> Self {
        Self(AtomicU8::new(flags.bits()))
    }

    /// Read the current flags.
    #[inline]
    pub fn get(&self) -> ContainerFlags {
        ContainerFlags::from_bits_truncate(self.0.load(Ordering::Relaxed))
    }

    /// Set the given bits.
    #[inline]
    pub fn insert(&self, flags: ContainerFlags) {
        self.0.fetch_or(flags.bits(), Ordering::Relaxed);
    }

    /// Clear the given bits.
    #[inline]
    pub fn remove(&self, flags: ContainerFlags) {
        self.0.fetch_and(!flags.bits(), Ordering::Relaxed);
    }

    /// Check whether the instance is committed.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.get().contains(ContainerFlags::FROZEN)
    }

    /// Check whether backing storage may be shared.
    #[inline]
    pub fn is_aliased(&self) -> bool {
        self.get().contains(ContainerFlags::ALIASED)
    }

    /// Clear the aliasing bit, returning whether it was set.
    ///
    /// Callers that see `true` must copy their storage before writing.
    #[inline]
    pub fn take_aliased(&self) -> bool {
        let previous = self.0.fetch_and(!ContainerFlags::ALIASED.bits(), Ordering::Relaxed);
        previous & ContainerFlags::ALIASED.bits() != 0
    }

    /// Mark this instance aliased and return the flags for its new sibling.
    ///
    /// The sibling inherits the frozen bit.
    #[inline]
    pub fn share(&self) -> FlagCell {
        self.insert(ContainerFlags::ALIASED);
        FlagCell::new(self.get())
    }

    /// Flags for a fresh instance that owns its storage, keeping only the
    /// frozen bit of this one.
    #[inline]
    pub fn detached(&self) -> FlagCell {
        FlagCell::new(self.get() & ContainerFlags::FROZEN)
    }
}

/// Copy `values` into a new vector with power-of-two capacity of at least `min`.
///
/// Used when an aliased instance takes ownership of its storage before a write.
pub(crate) fn copy_with_capacity(values: &[Value], min: usize) -> Vec<Value> {
    let mut copy = Vec::with_capacity(min.max(values.len()).next_power_of_two());
    copy.extend_from_slice(values);
    copy
}
