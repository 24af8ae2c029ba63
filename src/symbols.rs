//! Interned names shared by every class loaded through the same [`SymbolTable`].

use std::{
    borrow::Borrow,
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::{Arc, PoisonError, RwLock},
};

/// An interned, immutable string decoded from the modified UTF-8 of a class file.
///
/// Cloning a symbol is cheap; two symbols interned through the same table with the
/// same bytes share their storage.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    /// Creates a symbol that is not registered in any table.
    #[must_use]
    pub fn new(value: &str) -> Self {
        Self(Arc::from(value))
    }

    /// Decodes modified UTF-8 bytes, replacing sequences that cannot be decoded.
    pub(crate) fn from_java_bytes(bytes: &[u8]) -> Self {
        match cesu8::from_java_cesu8(bytes) {
            Ok(text) => Self(Arc::from(text.as_ref())),
            Err(_) => Self(Arc::from(String::from_utf8_lossy(bytes).as_ref())),
        }
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if both symbols share the same storage.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Deref for Symbol {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// A table of interned symbols shared between concurrently loading classes.
///
/// Lookups take the read lock; insertions are batched by the callers so that the write
/// lock is acquired once per batch rather than once per name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: RwLock<HashMap<Box<[u8]>, Symbol>>,
}

impl SymbolTable {
    /// Creates an empty symbol table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a symbol without inserting it.
    #[must_use]
    pub fn lookup_only(&self, bytes: &[u8]) -> Option<Symbol> {
        let symbols = self.symbols.read().unwrap_or_else(PoisonError::into_inner);
        symbols.get(bytes).cloned()
    }

    /// Interns every name in `names`, returning their symbols in the same order.
    ///
    /// Names already present (including names inserted by another thread since the
    /// caller's lookup) resolve to the existing symbol.
    pub fn batch_intern(&self, names: &[&[u8]]) -> Vec<Symbol> {
        let mut symbols = self.symbols.write().unwrap_or_else(PoisonError::into_inner);
        names
            .iter()
            .map(|&bytes| {
                symbols
                    .entry(Box::from(bytes))
                    .or_insert_with(|| Symbol::from_java_bytes(bytes))
                    .clone()
            })
            .collect()
    }

    /// Interns a single name.
    pub fn intern(&self, name: &str) -> Symbol {
        let bytes = cesu8::to_java_cesu8(name);
        if let Some(symbol) = self.lookup_only(&bytes) {
            return symbol;
        }
        self.batch_intern(&[bytes.as_ref()])
            .pop()
            .unwrap_or_else(|| Symbol::new(name))
    }

    /// Returns the number of interned symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if no symbol has been interned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn batch_intern_deduplicates() {
        let table = SymbolTable::new();
        let first = table.batch_intern(&[b"java/lang/Object".as_slice(), b"x"]);
        let second = table.batch_intern(&[b"x".as_slice()]);
        assert!(first[1].ptr_eq(&second[0]));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn lookup_only_does_not_insert() {
        let table = SymbolTable::new();
        assert!(table.lookup_only(b"missing").is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn modified_utf8_nul_is_decoded() {
        let table = SymbolTable::new();
        let symbols = table.batch_intern(&[[b'a', 0xC0, 0x80, b'b'].as_slice()]);
        assert_eq!(symbols[0].as_str(), "a\0b");
        assert_eq!(table.intern("a\0b"), symbols[0]);
    }

    #[test]
    fn concurrent_interning_agrees() {
        let table = Arc::new(SymbolTable::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || table.batch_intern(&[b"shared".as_slice(), b"name"]))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for result in &results[1..] {
            assert!(result[0].ptr_eq(&results[0][0]));
        }
        assert_eq!(table.len(), 2);
    }
}
