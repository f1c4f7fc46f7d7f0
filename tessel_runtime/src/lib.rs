//! Shape-based value representation engine for Tessel.
//!
//! This crate provides:
//! - A concurrent, self-purging shape trie shared by all keyed containers
//! - Keyed containers (objects, attribute lists) with inline, packed and
//!   dictionary storage regimes
//! - Positional containers (arrays, tuples with named slots)
//! - Copy-on-write aliasing with in-place and persistent mutation APIs
//!
//! Only the shape trie is safe for unsynchronized concurrent use. Container
//! instances are `Send + Sync` but must not be mutated from two threads at once.

#![deny(unsafe_op_in_unsafe_fn)]

pub mod config;
pub mod object;
pub mod types;
pub mod value;

// Re-export commonly used items
pub use config::{ConfigError, RuntimeConfig};
pub use object::{
    AttributeList, ObjectValue, Regime, Shape, ShapeId, ShapeTrie, init_shape_trie, shape_trie,
};
pub use types::{ArrayValue, TupleValue};
pub use value::Value;

// Re-export core key and error types
pub use tessel_core::{Symbol, TesselError, TesselResult, intern};
