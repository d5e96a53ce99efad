//! Computed signals (memos) and effects that derive from other signals.

use crate::signal::Signal;
use crate::storage::{run_tracked, with_signal_storage, SignalId};
use std::hash::{Hash, Hasher};
use std::{cell::Cell, fmt, marker::PhantomData, rc::Rc};

/// A computed signal that derives its value from other signals.
///
/// Memos track the signals they read and recompute when any of them is replaced.
///
/// ```rust,no_run
/// use observable_bridge::{Memo, Signal};
///
/// let count = Signal::new(5);
/// let doubled = Memo::new(move || count.get() * 2);
/// count.set(6);
/// assert_eq!(doubled.get(), 12);
/// ```
pub struct Memo<T> {
    signal: Signal<T>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Copy for Memo<T> {}

impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        self.signal == other.signal
    }
}

impl<T> Eq for Memo<T> {}

impl<T> Hash for Memo<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signal.hash(state);
    }
}

#[cfg(feature = "gpui")]
impl<T: fmt::Display + Clone + 'static> gpui::IntoElement for Memo<T> {
    type Element = gpui::SharedString;

    fn into_element(self) -> Self::Element {
        self.get().to_string().into()
    }
}

impl<T: 'static + Clone> Memo<T> {
    /// Create a new memo from a computation function.
    ///
    /// The function is called immediately and again whenever a dependency changes.
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        let signal = Signal::<T>::reserve();
        let id = signal.id();

        // Track dependencies while computing the first value so later writes to
        // those signals re-run this memo.
        signal.seed(run_tracked(id, &compute));

        let recomputing = Rc::new(Cell::new(false));
        let recompute = move || {
            if recomputing.replace(true) {
                return;
            }
            let value = run_tracked(id, &compute);
            signal.set(value);
            recomputing.set(false);
        };
        with_signal_storage(|storage| storage.register_observer(id, Rc::new(recompute)));

        Self {
            signal,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying signal.
    pub fn signal(&self) -> Signal<T> {
        self.signal
    }

    /// Get the current computed value.
    pub fn get(&self) -> T {
        self.signal.get()
    }

    /// Get the current value without tracking the read.
    pub fn get_untracked(&self) -> T {
        self.signal.get_untracked()
    }

    /// Read the computed value with a closure.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.signal.with(f)
    }

    /// Subscribe to changes in the computed value.
    pub fn subscribe(&self, callback: impl Fn() + 'static) {
        self.signal.subscribe(callback);
    }
}

impl<T: 'static + Clone + fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("value", &self.get_untracked())
            .finish()
    }
}

/// A side effect that re-runs whenever a signal it read is replaced.
///
/// Runs once on creation. Stops for good after [`Effect::dispose`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: SignalId,
}

impl Effect {
    pub fn new(effect: impl Fn() + 'static) -> Self {
        let id = Signal::new(()).id();
        let run = Rc::new(move || run_tracked(id, &effect));
        with_signal_storage(|storage| storage.register_observer(id, run.clone()));
        run();
        Self { id }
    }

    /// Stop re-running. Returns false if the effect was already disposed.
    pub fn dispose(self) -> bool {
        let run = with_signal_storage(|storage| storage.remove_observer(self.id));
        run.is_some()
    }
}
