//! Concurrent interning.
//!
//! Everything in the data model is immutable once interned, and
//! equality/hashing is by handle identity rather than structural value. We
//! get there with a generic, thread-safe get-or-insert interner keyed by
//! structural equality on first insert, returning a cheap-to-clone [`Interned<T>`]
//! handle whose `Eq`/`Hash` impls are pointer-based.
//!
//! This is the Rust analogue of the source's raw interned pointers (`const
//! Kind*`, `const Method*`, ...): an `Arc<T>` plays the role of the pointer,
//! and a `DashMap` plays the role of the process-wide interning table.

use dashmap::DashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A handle to an interned value. Two handles are equal iff they point at
/// the same allocation, regardless of the value's own `PartialEq`.
pub struct Interned<T>(Arc<T>);

impl<T> Interned<T> {
    pub fn ptr_id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }
}

impl<T> Clone for Interned<T> {
    fn clone(&self) -> Self {
        Interned(Arc::clone(&self.0))
    }
}

impl<T> PartialEq for Interned<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl<T> Eq for Interned<T> {}

impl<T> Hash for Interned<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ptr_id().hash(state);
    }
}

impl<T> PartialOrd for Interned<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Interned<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ptr_id().cmp(&other.ptr_id())
    }
}

impl<T> std::ops::Deref for Interned<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Interned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "&{:?}", self.0)
    }
}

/// A concurrent get-or-insert factory for one interned type.
pub struct Interner<T: Eq + Hash + Clone> {
    table: DashMap<T, Interned<T>>,
}

impl<T: Eq + Hash + Clone> Default for Interner<T> {
    fn default() -> Self {
        Self {
            table: DashMap::new(),
        }
    }
}

impl<T: Eq + Hash + Clone> Interner<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stable handle for `value`, inserting it if this is the
    /// first time it has been seen.
    pub fn intern(&self, value: T) -> Interned<T> {
        use dashmap::mapref::entry::Entry;
        match self.table.entry(value) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(vacant) => {
                let interned = Interned(Arc::new(vacant.key().clone()));
                vacant.insert(interned.clone());
                interned
            }
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates_and_is_pointer_equal() {
        let interner: Interner<String> = Interner::new();
        let a = interner.intern("UserInput".to_string());
        let b = interner.intern("UserInput".to_string());
        let c = interner.intern("Log".to_string());

        assert_eq!(a, b);
        assert_eq!(a.ptr_id(), b.ptr_id());
        assert_ne!(a, c);
        assert_eq!(interner.len(), 2);
    }
}
