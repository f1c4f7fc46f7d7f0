//! Symbol interning for O(1) key equality.
//!
//! Every field name stored in a keyed container, and every key recorded in a
//! shape, is a `Symbol`. Interning guarantees that two symbols with the same
//! content share one allocation, so equality and hashing reduce to pointer
//! operations on the hot lookup paths.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

/// A handle to an interned key.
///
/// Equality and hashing use the pointer. Ordering uses the string content and
/// breaks ties by pointer, so symbols with the same text from different tables
/// stay distinct keys in ordered maps.
#[derive(Clone)]
pub struct Symbol {
    inner: Arc<str>,
}

impl Symbol {
    #[inline]
    fn new(s: Arc<str>) -> Self {
        Self { inner: s }
    }

    /// Get the string content.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Get the length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Check if the symbol is the empty string.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Check whether the symbol can be written bare in notation (`a_1`),
    /// or must be quoted (`"two words"`).
    #[must_use]
    pub fn is_identifier(&self) -> bool {
        let mut chars = self.inner.chars();
        match chars.next() {
            Some(c) if c.is_alphabetic() || c == '_' => {
                chars.all(|c| c.is_alphanumeric() || c == '_')
            }
            _ => false,
        }
    }

    #[inline]
    fn ptr(&self) -> *const u8 {
        self.inner.as_ptr()
    }
}

impl PartialEq for Symbol {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr().hash(state);
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        if self == other {
            Ordering::Equal
        } else {
            self.as_str()
                .cmp(other.as_str())
                .then_with(|| self.ptr().cmp(&other.ptr()))
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl fmt::Display for Symbol {
    /// Writes the symbol as it appears in notation: bare when it is an
    /// identifier, quoted otherwise.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identifier() {
            f.write_str(self.as_str())
        } else {
            write!(f, "{:?}", self.as_str())
        }
    }
}

impl AsRef<str> for Symbol {
    #[inline]
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl From<&str> for Symbol {
    /// Interns through the global table.
    #[inline]
    fn from(s: &str) -> Self {
        intern(s)
    }
}

impl From<String> for Symbol {
    #[inline]
    fn from(s: String) -> Self {
        GLOBAL_SYMBOLS.intern_owned(s)
    }
}

impl From<&Symbol> for Symbol {
    #[inline]
    fn from(s: &Symbol) -> Self {
        s.clone()
    }
}

/// Thread-safe symbol table.
pub struct SymbolTable {
    symbols: RwLock<FxHashMap<Arc<str>, Symbol>>,
}

impl SymbolTable {
    /// Create a new, empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            symbols: RwLock::new(FxHashMap::default()),
        }
    }

    /// Intern a string, returning its unique handle.
    pub fn intern(&self, s: &str) -> Symbol {
        if let Some(symbol) = self.symbols.read().get(s) {
            return symbol.clone();
        }

        let mut symbols = self.symbols.write();
        // Another writer may have won the race between the two locks.
        if let Some(symbol) = symbols.get(s) {
            return symbol.clone();
        }
        let arc: Arc<str> = s.into();
        let symbol = Symbol::new(arc.clone());
        symbols.insert(arc, symbol.clone());
        symbol
    }

    /// Intern an owned string, reusing its allocation when it is new.
    pub fn intern_owned(&self, s: String) -> Symbol {
        if let Some(symbol) = self.symbols.read().get(s.as_str()) {
            return symbol.clone();
        }

        let mut symbols = self.symbols.write();
        if let Some(symbol) = symbols.get(s.as_str()) {
            return symbol.clone();
        }
        let arc: Arc<str> = s.into();
        let symbol = Symbol::new(arc.clone());
        symbols.insert(arc, symbol.clone());
        symbol
    }

    /// Get an already-interned symbol without creating a new one.
    #[must_use]
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.symbols.read().get(s).cloned()
    }

    /// Get the number of interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.read().len()
    }

    /// Check if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.read().is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable")
            .field("count", &self.len())
            .finish()
    }
}

/// The process-wide symbol table used by `Symbol::from`.
pub static GLOBAL_SYMBOLS: LazyLock<SymbolTable> = LazyLock::new(SymbolTable::new);

/// Intern a string using the global table.
#[inline]
pub fn intern(s: &str) -> Symbol {
    GLOBAL_SYMBOLS.intern(s)
}

/// Find a symbol in the global table without interning it.
///
/// A string that was never interned cannot be a key of any container, so
/// lookups by name use this to avoid growing the table.
#[inline]
pub fn lookup_symbol(s: &str) -> Option<Symbol> {
    GLOBAL_SYMBOLS.get(s)
}
