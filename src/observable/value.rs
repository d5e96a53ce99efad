//! Tracked values.

use super::runtime::{self, AtomId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// A value in the observable graph.
///
/// Reads made while a reaction, autorun or computed runs subscribe that derivation
/// to this value; writes re-run it (once per transaction). Handles are cheap to
/// clone and share the same value. The value leaves the graph when the last handle
/// is dropped.
///
/// Closures passed to [`Observable::with`] and [`Observable::update`] must not
/// access the same observable.
pub struct Observable<T> {
    inner: Rc<Inner<T>>,
}

struct Inner<T> {
    atom: AtomId,
    value: RefCell<T>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        runtime::remove_atom(self.atom);
    }
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(Inner {
                atom: runtime::create_atom(),
                value: RefCell::new(value),
            }),
        }
    }

    /// Get a clone of the current value, tracking the read.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        runtime::report_observed(self.inner.atom);
        self.inner.value.borrow().clone()
    }

    /// Get a clone of the current value without tracking the read.
    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Read the value with a closure, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::report_observed(self.inner.atom);
        f(&self.inner.value.borrow())
    }

    /// Set a new value. Equal values are ignored.
    ///
    /// Returns true if observers were notified.
    pub fn set(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.replace(value);
        true
    }

    /// Swap in a new value and notify observers even if it is equal to the old one.
    pub fn replace(&self, value: T) -> T {
        let previous = std::mem::replace(&mut *self.inner.value.borrow_mut(), value);
        runtime::report_changed(self.inner.atom);
        previous
    }

    /// Mutate the value in place and notify observers.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        runtime::report_changed(self.inner.atom);
        result
    }

    #[cfg(test)]
    pub(crate) fn atom(&self) -> AtomId {
        self.inner.atom
    }
}

impl<T: 'static + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("atom", &self.inner.atom)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}
