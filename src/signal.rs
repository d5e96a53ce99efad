//! Host-side containers: the writable [`Signal`] a bridge owns and the
//! [`ReadOnlySignal`] it hands out.

use crate::error::Error;
use crate::storage::{notify, with_signal_storage, SignalId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Copyable handle to a host container holding a `T`.
///
/// Every write replaces the value and wakes the container's subscribers, and
/// any [`Memo`](crate::Memo) or [`Effect`](crate::Effect) that read it.
///
/// ```rust,no_run
/// use observable_bridge::Signal;
///
/// let count = Signal::new(0);
/// count.update(|n| *n += 1);
/// assert_eq!(count.get(), 1);
/// ```
pub struct Signal<T> {
    id: SignalId,
    _phantom: PhantomData<T>,
}

impl<T> Copy for Signal<T> {}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(feature = "gpui")]
impl<T: fmt::Display + Clone + 'static> gpui::IntoElement for Signal<T> {
    type Element = gpui::SharedString;

    fn into_element(self) -> Self::Element {
        self.get().to_string().into()
    }
}

impl<T: 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        with_signal_storage(|storage| Self::from_id(storage.insert(value)))
    }

    /// Allocate a container whose first value arrives later through [`Signal::seed`].
    pub(crate) fn reserve() -> Self {
        with_signal_storage(|storage| Self::from_id(storage.insert(())))
    }

    /// Store the initial value of a reserved container. Nobody is notified.
    pub(crate) fn seed(&self, value: T) {
        with_signal_storage(|storage| storage.replace(self.id, value));
    }

    fn from_id(id: SignalId) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    fn read<R>(&self, tracked: bool, f: impl FnOnce(&T) -> R) -> R {
        with_signal_storage(|storage| {
            if tracked {
                storage.track_read(self.id);
            }
            f(storage.get::<T>(self.id).expect("Signal value not found"))
        })
    }

    /// Clone out the value, registering a dependency for the running observer.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.read(true, T::clone)
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.read(false, T::clone)
    }

    /// Borrow the value for the duration of `f`.
    ///
    /// `f` runs while the arena is borrowed, so it must not touch other signals.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.read(true, f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.read(false, f)
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        if let Some(callbacks) = with_signal_storage(|storage| storage.set(self.id, value)) {
            notify(callbacks);
        }
    }

    /// Mutate the value in place and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        if let Some(((), callbacks)) = with_signal_storage(|storage| storage.update(self.id, f)) {
            notify(callbacks);
        }
    }

    /// Run `callback` after every write. Subscriptions live as long as the arena.
    pub fn subscribe(&self, callback: impl Fn() + 'static) {
        with_signal_storage(|storage| storage.subscribe(self.id, callback));
    }

    pub fn read_only(self) -> ReadOnlySignal<T> {
        ReadOnlySignal { inner: self }
    }

    pub fn id(&self) -> SignalId {
        self.id
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_untracked(|value| {
            f.debug_struct("Signal")
                .field("id", &self.id)
                .field("value", value)
                .finish()
        })
    }
}

/// The caller's view of a bridge container.
///
/// Reads and subscriptions go straight to the container. There is no setter;
/// [`ReadOnlySignal::try_set`] always fails with [`Error::ReadOnly`].
pub struct ReadOnlySignal<T> {
    inner: Signal<T>,
}

impl<T> Copy for ReadOnlySignal<T> {}

impl<T> Clone for ReadOnlySignal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for ReadOnlySignal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl<T> Eq for ReadOnlySignal<T> {}

impl<T> Hash for ReadOnlySignal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

#[cfg(feature = "gpui")]
impl<T: fmt::Display + Clone + 'static> gpui::IntoElement for ReadOnlySignal<T> {
    type Element = gpui::SharedString;

    fn into_element(self) -> Self::Element {
        self.get().to_string().into()
    }
}

impl<T: 'static> ReadOnlySignal<T> {
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.get()
    }

    pub fn get_untracked(&self) -> T
    where
        T: Clone,
    {
        self.inner.get_untracked()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with(f)
    }

    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.with_untracked(f)
    }

    pub fn subscribe(&self, callback: impl Fn() + 'static) {
        self.inner.subscribe(callback);
    }

    /// Writes through this handle are refused. The value is dropped and the
    /// container keeps what it had.
    pub fn try_set(&self, value: T) -> Result<(), Error> {
        drop(value);
        tracing::warn!(signal = ?self.inner.id(), "write rejected: signal is read-only");
        Err(Error::ReadOnly(self.inner.id()))
    }

    pub fn id(&self) -> SignalId {
        self.inner.id()
    }
}

impl<T: 'static + fmt::Debug> fmt::Debug for ReadOnlySignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.with_untracked(|value| f.debug_tuple("ReadOnlySignal").field(value).finish())
    }
}
