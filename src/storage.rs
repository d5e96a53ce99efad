//! Generational arena storage for host signals.
//!
//! Uses a slot map with generational indices to provide memory-safe Copy handles
//! to signal values. Observers (memos and effects) are keyed by the id of a signal
//! they own, so a read made while an observer runs can subscribe that observer to
//! the signal being read.

use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

new_key_type! {
    /// Unique identifier for a signal in the storage.
    pub struct SignalId;
}

/// Subscriber callback for signal changes.
pub(crate) type Subscriber = Rc<dyn Fn()>;

/// Thread-local storage for all signals.
///
/// This is the backing store for all signal values and their subscribers.
/// It uses interior mutability to allow Copy handles to access and modify values.
pub(crate) struct SignalStorage {
    /// Arena of type-erased signal values indexed by SignalId.
    values: SlotMap<SignalId, Box<dyn Any>>,
    /// Subscribers for each signal, tagged with the observer that tracked the
    /// read (`None` for plain subscriptions).
    subscribers: BTreeMap<SignalId, Vec<(Option<SignalId>, Subscriber)>>,
    /// Re-run callbacks for memos and effects, keyed by their own id.
    observers: BTreeMap<SignalId, Subscriber>,
    /// Dependencies tracked for each observer (observer -> set of signals read).
    dependencies: BTreeMap<SignalId, HashSet<SignalId>>,
    /// The current observer (if any) for dependency tracking.
    current_observer: Option<SignalId>,
}

impl SignalStorage {
    /// Create a new empty signal storage.
    pub fn new() -> Self {
        Self {
            values: SlotMap::with_key(),
            subscribers: BTreeMap::new(),
            observers: BTreeMap::new(),
            dependencies: BTreeMap::new(),
            current_observer: None,
        }
    }

    /// Insert a new signal value and return its ID.
    pub fn insert<T: 'static>(&mut self, value: T) -> SignalId {
        self.values.insert(Box::new(value))
    }

    /// Get a reference to a signal value.
    pub fn get<T: 'static>(&self, id: SignalId) -> Option<&T> {
        self.values.get(id).and_then(|value| value.downcast_ref())
    }

    /// Get a mutable reference to a signal value.
    pub fn get_mut<T: 'static>(&mut self, id: SignalId) -> Option<&mut T> {
        self.values.get_mut(id).and_then(|value| value.downcast_mut())
    }

    /// Replace a signal value without notifying anyone.
    ///
    /// Used to seed slots reserved before their first value was computed.
    pub fn replace<T: 'static>(&mut self, id: SignalId, value: T) -> bool {
        match self.values.get_mut(id) {
            Some(slot) => {
                *slot = Box::new(value);
                true
            }
            None => false,
        }
    }

    fn callbacks(&self, id: SignalId) -> Vec<Subscriber> {
        self.subscribers
            .get(&id)
            .map(|subs| subs.iter().map(|(_, callback)| callback.clone()).collect())
            .unwrap_or_default()
    }

    /// Update a signal value and return the subscribers to notify.
    pub fn set<T: 'static>(&mut self, id: SignalId, value: T) -> Option<Vec<Subscriber>> {
        if self.replace(id, value) {
            Some(self.callbacks(id))
        } else {
            None
        }
    }

    /// Update a signal value with a closure and return the subscribers to notify.
    pub fn update<T: 'static, R>(
        &mut self,
        id: SignalId,
        f: impl FnOnce(&mut T) -> R,
    ) -> Option<(R, Vec<Subscriber>)> {
        let result = f(self.get_mut::<T>(id)?);
        Some((result, self.callbacks(id)))
    }

    /// Subscribe to changes on a signal.
    pub fn subscribe(&mut self, id: SignalId, callback: impl Fn() + 'static) {
        self.push_subscriber(id, None, Rc::new(callback));
    }

    fn push_subscriber(&mut self, id: SignalId, owner: Option<SignalId>, callback: Subscriber) {
        self.subscribers.entry(id).or_default().push((owner, callback));
    }

    /// Register the re-run callback of a memo or effect.
    pub fn register_observer(&mut self, id: SignalId, run: Subscriber) {
        self.observers.insert(id, run);
    }

    /// Forget an observer, unsubscribe it from everything it read and free its slot.
    ///
    /// Returns the observer's re-run callback so the caller can drop it with the
    /// storage released.
    pub fn remove_observer(&mut self, id: SignalId) -> Option<Subscriber> {
        let run = self.observers.remove(&id)?;
        for dependency in self.dependencies.remove(&id).unwrap_or_default() {
            if let Some(subs) = self.subscribers.get_mut(&dependency) {
                subs.retain(|(owner, _)| *owner != Some(id));
                if subs.is_empty() {
                    self.subscribers.remove(&dependency);
                }
            }
        }
        self.subscribers.remove(&id);
        self.values.remove(id);
        Some(run)
    }

    /// Track a read for the current observer.
    pub fn track_read(&mut self, id: SignalId) {
        if let Some(observer_id) = self.current_observer {
            let deps = self.dependencies.entry(observer_id).or_default();
            if deps.insert(id) {
                // Only subscribe once per observer/dependency pair.
                let rerun: Subscriber = Rc::new(move || run_observer(observer_id));
                self.push_subscriber(id, Some(observer_id), rerun);
            }
        }
    }

    /// Set the current observer for dependency tracking.
    pub fn set_observer(&mut self, observer: Option<SignalId>) -> Option<SignalId> {
        // Dependencies are never cleared on re-run: a dependency already tracked
        // is not subscribed again, a new one is.
        std::mem::replace(&mut self.current_observer, observer)
    }
}

thread_local! {
    static STORAGE: RefCell<SignalStorage> = RefCell::new(SignalStorage::new());
}

/// Access the thread-local signal storage.
pub(crate) fn with_signal_storage<R>(f: impl FnOnce(&mut SignalStorage) -> R) -> R {
    STORAGE.with(|storage| f(&mut storage.borrow_mut()))
}

/// Re-run an observer by temporarily borrowing storage to fetch its callback.
pub(crate) fn run_observer(id: SignalId) {
    let run = with_signal_storage(|storage| storage.observers.get(&id).cloned());
    if let Some(run) = run {
        run();
    }
}

/// Run `f` with `observer` as the current observer, restoring the previous one
/// afterwards (also when `f` unwinds).
pub(crate) fn run_tracked<R>(observer: SignalId, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<SignalId>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0;
            with_signal_storage(|storage| storage.set_observer(previous));
        }
    }

    let _restore = Restore(with_signal_storage(|storage| {
        storage.set_observer(Some(observer))
    }));
    f()
}

/// Invoke subscriber callbacks outside of any storage borrow.
pub(crate) fn notify(callbacks: Vec<Subscriber>) {
    for callback in callbacks {
        callback();
    }
}
