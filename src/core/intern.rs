//! Atom interning for the logical-type runtime.
//!
//! Maps atom strings (`type:...`, `instance:...`) to compact u32 ids so
//! formulas and the subtype relation can work over integers. Bidirectional
//! maps give O(1) lookups in both directions.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU32, Ordering};

pub type AtomId = u32;

/// Global atom interner shared by the default type store.
static INTERNER: Lazy<Interner> = Lazy::new(Interner::new);

/// Thread-safe string interner.
pub struct Interner {
    text_to_id: DashMap<String, AtomId>,
    id_to_text: DashMap<AtomId, String>,
    next_id: AtomicU32,
}

impl Interner {
    pub fn new() -> Self {
        Self {
            text_to_id: DashMap::with_capacity(256),
            id_to_text: DashMap::with_capacity(256),
            // Atom 0 is reserved so DIMACS-style signed literals stay valid.
            next_id: AtomicU32::new(1),
        }
    }

    pub fn intern(&self, text: &str) -> AtomId {
        if let Some(id) = self.text_to_id.get(text) {
            return *id;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.text_to_id.insert(text.to_string(), id);
        self.id_to_text.insert(id, text.to_string());
        id
    }

    pub fn get_id(&self, text: &str) -> Option<AtomId> {
        self.text_to_id.get(text).map(|id| *id)
    }

    pub fn get_text(&self, id: AtomId) -> Option<String> {
        self.id_to_text.get(&id).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.text_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_to_id.is_empty()
    }
}

impl Default for Interner {
    fn default() -> Self {
        Self::new()
    }
}

/// Intern into the global interner.
pub fn intern(text: &str) -> AtomId {
    INTERNER.intern(text)
}

pub fn atom_text(id: AtomId) -> Option<String> {
    INTERNER.get_text(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_stable() {
        let a = intern("type:builtins.int");
        let b = intern("type:builtins.int");
        assert_eq!(a, b);
        assert_eq!(atom_text(a).as_deref(), Some("type:builtins.int"));
    }

    #[test]
    fn test_ids_start_at_one() {
        let interner = Interner::new();
        assert_eq!(interner.intern("x"), 1);
        assert_eq!(interner.intern("y"), 2);
    }
}
