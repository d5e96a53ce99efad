//! Derived values in the observable graph.

use super::reaction::Disposer;
use super::runtime::{self, ReactionKind};
use super::value::Observable;
use std::fmt;
use std::rc::Rc;

/// A value derived from other observables and computeds.
///
/// The derivation runs once on creation and again, eagerly, whenever something it
/// read changes. Readers are only notified when the result differs from the
/// previous one. Within a flush every pending computed settles before any reaction
/// runs, and reads inside a transaction settle pending computeds first, so a
/// computed never lags the writes already made. The derivation must not write
/// observables.
pub struct Computed<T> {
    inner: Rc<Inner<T>>,
}

struct Inner<T> {
    value: Observable<T>,
    _disposer: Disposer,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PartialEq + Clone + 'static> Computed<T> {
    /// Panics raised by the first evaluation propagate to the caller.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self::register(None, compute)
    }

    pub fn named(name: impl Into<String>, compute: impl Fn() -> T + 'static) -> Self {
        Self::register(Some(name.into()), compute)
    }

    fn register(name: Option<String>, compute: impl Fn() -> T + 'static) -> Self {
        let id = runtime::create_reaction(name, ReactionKind::Computed);
        let disposer = Disposer::new(id);

        let value = Observable::new(runtime::track(id, &compute));
        let target = value.clone();
        runtime::set_runner(
            id,
            Rc::new(move || {
                let next = runtime::track(id, &compute);
                target.set(next);
            }),
        );

        Self {
            inner: Rc::new(Inner {
                value,
                _disposer: disposer,
            }),
        }
    }

    /// Current value, tracking the read.
    pub fn get(&self) -> T {
        runtime::settle_computeds();
        self.inner.value.get()
    }

    pub fn get_untracked(&self) -> T {
        runtime::settle_computeds();
        self.inner.value.get_untracked()
    }

    /// Read the current value with a closure, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::settle_computeds();
        self.inner.value.with(f)
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Computed").field(&self.inner.value).finish()
    }
}
