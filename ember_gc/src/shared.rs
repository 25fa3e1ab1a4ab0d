//! Shared heap handle.
//!
//! The heap is the one piece of mutable state both the interpreter and
//! worker threads touch. [`SharedHeap`] is a cloneable handle whose
//! methods take the heap mutex internally; worker threads are required
//! to go through it for every value they read or write, which makes the
//! mutex the synchronization point the memory model relies on.
//!
//! Callers must not nest [`SharedHeap::with`] invocations — the mutex is
//! not re-entrant, and nothing here needs it to be: collection happens
//! as a plain method call inside a single lock hold.

use crate::config::GcConfig;
use crate::heap::Heap;
use ember_core::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Cloneable handle to the mutex-guarded heap.
#[derive(Clone)]
pub struct SharedHeap {
    inner: Arc<Mutex<Heap>>,
}

impl SharedHeap {
    /// Create a heap with the given configuration.
    pub fn new(config: GcConfig) -> SharedHeap {
        SharedHeap {
            inner: Arc::new(Mutex::new(Heap::new(config))),
        }
    }

    /// Create a heap with default configuration.
    pub fn with_defaults() -> SharedHeap {
        SharedHeap::new(GcConfig::default())
    }

    /// Run `f` with exclusive heap access.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Allocate a string in its tightest representation.
    pub fn create_string(&self, bytes: &[u8]) -> Value {
        self.with(|heap| heap.create_string(bytes))
    }

    /// Bytes of any string representation.
    pub fn string_bytes(&self, value: Value) -> Option<Vec<u8>> {
        self.with(|heap| heap.string_bytes(value))
    }

    /// Whether a collection is due.
    pub fn should_collect(&self) -> bool {
        self.with(|heap| heap.should_collect())
    }

    /// Register a persistent temporary and receive a guard that
    /// unregisters it on drop.
    pub fn persist(&self, value: Value) -> PersistentGuard {
        self.with(|heap| heap.mark_persistent(value));
        PersistentGuard {
            heap: self.clone(),
            value,
        }
    }
}

/// RAII registration of a persistent temporary.
pub struct PersistentGuard {
    heap: SharedHeap,
    value: Value,
}

impl PersistentGuard {
    /// The protected value.
    pub fn value(&self) -> Value {
        self.value
    }
}

impl Drop for PersistentGuard {
    fn drop(&mut self) {
        let value = self.value;
        self.heap.with(|heap| heap.unmark_persistent(value));
    }
}
