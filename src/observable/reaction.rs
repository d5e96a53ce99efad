//! Subscriptions on the observable graph: reactions, autoruns and error handlers.

use super::runtime::{self, HandlerId, ReactionId, ReactionKind};
use crate::error::ReactionError;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Owned handle to a reaction or autorun.
///
/// [`Disposer::dispose`] consumes the handle, so a subscription can only be
/// disposed once. Dropping the handle disposes as well; call [`Disposer::detach`]
/// to keep the subscription for the rest of the thread's life.
#[must_use = "dropping a Disposer disposes its subscription; call `detach` to keep it"]
pub struct Disposer {
    id: Option<ReactionId>,
}

impl Disposer {
    pub(crate) fn new(id: ReactionId) -> Self {
        Self { id: Some(id) }
    }

    /// Stop the subscription. Nothing it observed can re-run it afterwards.
    pub fn dispose(mut self) {
        if let Some(id) = self.id.take() {
            runtime::dispose_reaction(id);
        }
    }

    /// Keep the subscription alive without holding on to the handle.
    pub fn detach(mut self) {
        self.id = None;
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            runtime::dispose_reaction(id);
        }
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer").field("id", &self.id).finish()
    }
}

/// Settings for [`reaction`].
pub struct ReactionOptions<T> {
    /// Run the effect with the first value of the expression too.
    pub fire_immediately: bool,
    /// Returns true when two values of the expression are the same.
    pub equals: fn(&T, &T) -> bool,
    /// Name used in logs and in [`ReactionError`]s.
    pub name: Option<String>,
}

impl<T: PartialEq> Default for ReactionOptions<T> {
    fn default() -> Self {
        Self {
            fire_immediately: false,
            equals: T::eq,
            name: None,
        }
    }
}

impl<T> ReactionOptions<T> {
    pub fn fire_immediately(mut self, fire_immediately: bool) -> Self {
        self.fire_immediately = fire_immediately;
        self
    }

    pub fn equals(mut self, equals: fn(&T, &T) -> bool) -> Self {
        self.equals = equals;
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl<T> fmt::Debug for ReactionOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionOptions")
            .field("fire_immediately", &self.fire_immediately)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Run `effect` whenever the value returned by `expression` changes.
///
/// `expression` is tracked and runs once at registration (or when the enclosing
/// transaction ends) to discover its dependencies; `effect` is not called for that
/// first value unless `fire_immediately` is set. Afterwards, every change of a
/// dependency re-runs `expression`, and `effect` runs untracked with the new value
/// when `equals(previous, next)` is false. Several writes inside one transaction
/// re-run `expression` once.
pub fn reaction<T, X, F>(expression: X, effect: F, options: ReactionOptions<T>) -> Disposer
where
    T: 'static,
    X: Fn() -> T + 'static,
    F: FnMut(&T) + 'static,
{
    let ReactionOptions {
        fire_immediately,
        equals,
        name,
    } = options;
    let id = runtime::create_reaction(name, ReactionKind::Reaction);
    let disposer = Disposer::new(id);

    let previous: RefCell<Option<T>> = RefCell::new(None);
    let effect = RefCell::new(effect);
    let runner = move || {
        let next = runtime::track(id, &expression);
        let fire = match previous.borrow().as_ref() {
            None => fire_immediately,
            Some(previous) => !equals(previous, &next),
        };
        *previous.borrow_mut() = Some(next);

        if fire {
            if let Some(value) = previous.borrow().as_ref() {
                runtime::untracked(|| (&mut *effect.borrow_mut())(value));
            }
        }
    };
    runtime::set_runner(id, Rc::new(runner));
    runtime::schedule(id);
    runtime::run_pending();
    disposer
}

/// Run `body` now and again whenever anything it read changes.
///
/// Dependencies are recomputed on every run: a value read on one run but not the
/// next stops triggering re-runs. Registered inside a transaction, the first run
/// happens when the transaction ends.
pub fn autorun(body: impl FnMut() + 'static) -> Disposer {
    register_autorun(None, body)
}

/// [`autorun`] with a name for logs and errors.
pub fn autorun_named(name: impl Into<String>, body: impl FnMut() + 'static) -> Disposer {
    register_autorun(Some(name.into()), body)
}

fn register_autorun(name: Option<String>, body: impl FnMut() + 'static) -> Disposer {
    let id = runtime::create_reaction(name, ReactionKind::Autorun);
    let disposer = Disposer::new(id);

    let body = RefCell::new(body);
    runtime::set_runner(
        id,
        Rc::new(move || runtime::track(id, || (&mut *body.borrow_mut())())),
    );
    runtime::schedule(id);
    runtime::run_pending();
    disposer
}

/// Handle returned by [`on_reaction_error`]; dropping it unregisters the handler.
#[must_use = "dropping the handle unregisters the handler"]
pub struct ErrorHandlerGuard {
    id: HandlerId,
}

impl Drop for ErrorHandlerGuard {
    fn drop(&mut self) {
        runtime::remove_error_handler(self.id);
    }
}

impl fmt::Debug for ErrorHandlerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandlerGuard").field("id", &self.id).finish()
    }
}

/// Listen to failures isolated while running reactions on this thread.
pub fn on_reaction_error(handler: impl Fn(&ReactionError) + 'static) -> ErrorHandlerGuard {
    ErrorHandlerGuard {
        id: runtime::add_error_handler(Rc::new(handler)),
    }
}

/// Run `f` as one batch of writes: reactions affected by it run once, after the
/// outermost transaction returns, and see only its final state.
pub fn transaction<R>(f: impl FnOnce() -> R) -> R {
    struct EndBatch;

    impl Drop for EndBatch {
        fn drop(&mut self) {
            runtime::end_batch();
        }
    }

    runtime::start_batch();
    let _end = EndBatch;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::{untracked, Observable};
    use std::cell::Cell;

    #[test]
    fn test_reaction_skips_first_value_by_default() {
        let count = Observable::new(0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _disposer = {
            let count = count.clone();
            let seen = seen.clone();
            reaction(
                move || count.get(),
                move |value| seen.borrow_mut().push(*value),
                ReactionOptions::default(),
            )
        };
        assert!(seen.borrow().is_empty());

        count.set(1);
        count.set(2);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_reaction_fire_immediately() {
        let count = Observable::new(3);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let _disposer = {
            let count = count.clone();
            let seen = seen.clone();
            reaction(
                move || count.get(),
                move |value| seen.borrow_mut().push(*value),
                ReactionOptions::default().fire_immediately(true),
            )
        };
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn test_reaction_uses_structural_equality() {
        let items = Observable::new(vec![1, 2]);
        let fired = Rc::new(Cell::new(0));
        let _disposer = {
            let items = items.clone();
            let fired = fired.clone();
            reaction(
                move || items.get(),
                move |_| fired.set(fired.get() + 1),
                ReactionOptions::default(),
            )
        };

        items.replace(vec![1, 2]);
        assert_eq!(fired.get(), 0);
        items.update(|items| items.push(3));
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_custom_equals() {
        let value = Observable::new(10);
        let fired = Rc::new(Cell::new(0));
        let _disposer = {
            let value = value.clone();
            let fired = fired.clone();
            reaction(
                move || value.get(),
                move |_| fired.set(fired.get() + 1),
                ReactionOptions::default().equals(|a: &i32, b: &i32| a / 10 == b / 10),
            )
        };

        value.set(15);
        assert_eq!(fired.get(), 0);
        value.set(21);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_effect_is_untracked() {
        let trigger = Observable::new(0);
        let other = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        let _disposer = {
            let trigger = trigger.clone();
            let other = other.clone();
            let runs = runs.clone();
            reaction(
                move || trigger.get(),
                move |_| {
                    other.get();
                    runs.set(runs.get() + 1);
                },
                ReactionOptions::default(),
            )
        };

        trigger.set(1);
        assert_eq!(runs.get(), 1);
        other.set(5);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_autorun_runs_immediately_and_on_change() {
        let count = Observable::new(1);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let disposer = {
            let count = count.clone();
            let seen = seen.clone();
            autorun(move || seen.borrow_mut().push(count.get()))
        };
        count.set(2);
        disposer.dispose();
        count.set(3);
        assert_eq!(*seen.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_autorun_inside_transaction_runs_at_end() {
        let runs = Rc::new(Cell::new(0));
        let disposer = transaction(|| {
            let counter = runs.clone();
            let disposer = autorun(move || counter.set(counter.get() + 1));
            assert_eq!(runs.get(), 0);
            disposer
        });
        assert_eq!(runs.get(), 1);
        disposer.detach();
    }

    #[test]
    fn test_transaction_batches_writes() {
        let a = Observable::new(1);
        let b = Observable::new(2);
        let sums = Rc::new(RefCell::new(Vec::new()));
        let _disposer = {
            let (a, b) = (a.clone(), b.clone());
            let sums = sums.clone();
            autorun(move || sums.borrow_mut().push(a.get() + b.get()))
        };

        let result = transaction(|| {
            a.set(10);
            transaction(|| b.set(20));
            a.set(100);
            "done"
        });
        assert_eq!(result, "done");
        assert_eq!(*sums.borrow(), vec![3, 120]);
    }

    #[test]
    fn test_dropping_disposer_disposes() {
        let count = Observable::new(0);
        let runs = Rc::new(Cell::new(0));
        {
            let count = count.clone();
            let runs = runs.clone();
            let _disposer = autorun(move || {
                count.get();
                runs.set(runs.get() + 1);
            });
        }
        count.set(1);
        assert_eq!(runs.get(), 1);
        assert_eq!(runtime::reaction_count(), 0);
    }

    #[test]
    fn test_panicking_reaction_is_isolated() {
        let count = Observable::new(0);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let _guard = {
            let errors = errors.clone();
            on_reaction_error(move |error| errors.borrow_mut().push(error.clone()))
        };
        let healthy_runs = Rc::new(Cell::new(0));

        let _failing = {
            let count = count.clone();
            autorun_named("failing", move || {
                if count.get() > 0 {
                    panic!("count went positive");
                }
            })
        };
        let _healthy = {
            let count = count.clone();
            let healthy_runs = healthy_runs.clone();
            autorun(move || {
                count.get();
                healthy_runs.set(healthy_runs.get() + 1);
            })
        };

        count.set(1);
        assert_eq!(healthy_runs.get(), 2);
        assert_eq!(
            *errors.borrow(),
            vec![ReactionError::Panicked {
                name: "failing".into(),
                message: "count went positive".into(),
            }]
        );

        // The failed run kept its dependency.
        count.set(2);
        assert_eq!(errors.borrow().len(), 2);
    }

    #[test]
    fn test_unstable_reactions_are_abandoned() {
        crate::observable::configure(
            crate::observable::GraphConfig::default().with_max_reaction_iterations(5),
        );
        let count = Observable::new(0);
        let errors = Rc::new(RefCell::new(Vec::new()));
        let _guard = {
            let errors = errors.clone();
            on_reaction_error(move |error| errors.borrow_mut().push(error.clone()))
        };

        let _looping = {
            let count = count.clone();
            autorun_named("looping", move || {
                let next = count.get() + 1;
                untracked(|| count.set(next));
            })
        };
        // Dependencies bind when the first run ends, so its own write is not seen.
        assert!(errors.borrow().is_empty());
        assert_eq!(count.get_untracked(), 1);

        count.set(100);
        assert_eq!(
            *errors.borrow(),
            vec![ReactionError::Unstable {
                iterations: 5,
                name: "looping".into(),
            }]
        );
        assert!(!runtime::in_transaction());

        // Still subscribed: the next write loops and is abandoned again.
        count.set(-100);
        assert_eq!(errors.borrow().len(), 2);
    }
}
