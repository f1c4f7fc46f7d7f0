//! Positional container types.
//!
//! Arrays and tuples share the copy-on-write discipline of keyed storage but
//! not the shape trie.

pub mod array;
pub mod tuple;

pub use array::ArrayValue;
pub use tuple::{TupleShape, TupleValue};
