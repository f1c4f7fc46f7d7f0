//! Keyed container machinery.
//!
//! The shape trie describes key layouts shared across instances; keyed
//! containers pair a shape with storage whose regime follows the key count.

pub mod dict_table;
pub mod flags;
pub mod keyed;
pub mod shape;

pub use dict_table::DictTable;
pub use flags::{ContainerFlags, FlagCell};
pub use keyed::{
    AttributeFamily, AttributeList, Keyed, KeyedFamily, ObjectFamily, ObjectValue, Regime,
};
pub use shape::{Shape, ShapeId, ShapeStats, ShapeTrie, init_shape_trie, shape_trie};
