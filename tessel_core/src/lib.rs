//! # Tessel Core
//!
//! Foundational types shared by the Tessel storage engine:
//!
//! - **Interning**: `Symbol` keys with O(1) equality, used as field names by
//!   every keyed container and by the shape trie
//! - **Error Handling**: the error taxonomy raised by container operations

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod intern;

pub use error::{TesselError, TesselResult};
pub use intern::{Symbol, SymbolTable, intern, lookup_symbol};

/// Tessel version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
