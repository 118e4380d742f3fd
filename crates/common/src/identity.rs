//! Address-based identity for shared objects.
//!
//! Cache slots are keyed by *which* reader and *which* value object they hold,
//! never by what those objects contain. Two structurally equal readers are
//! still two cache slots, so every map keyed by a reader or a value goes
//! through [`Identity`] rather than the wrapped type's own `Eq`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Shared handle whose equality and hash are the address of the allocation.
pub struct Identity<T: ?Sized>(Arc<T>);

impl<T: ?Sized> Identity<T> {
    /// Wraps an existing shared allocation.
    pub fn new(inner: Arc<T>) -> Self {
        Self(inner)
    }

    /// Borrows the wrapped object.
    pub fn get(&self) -> &T {
        &self.0
    }

    /// Address of the allocation with any pointer metadata dropped.
    ///
    /// Stable for as long as at least one handle is alive.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }
}

impl<T> Identity<T> {
    /// Allocates `value` and wraps it. Every call yields a distinct identity.
    pub fn from_value(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T: ?Sized> Clone for Identity<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for Identity<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T: ?Sized> Eq for Identity<T> {}

impl<T: ?Sized> Hash for Identity<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T: ?Sized> fmt::Debug for Identity<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:#x})", self.addr())
    }
}
