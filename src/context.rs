//! Host integration: the scope-end hook bridges rely on.
//!
//! A [`BridgeHost`] is whatever owns a bridge: a [`Scope`], or with the `gpui`
//! feature a GPUI entity's `Context`. [`ObservedContext`] adds the bridge entry
//! points as methods on every host.

use crate::bridge;
use crate::scope::Scope;
use crate::signal::ReadOnlySignal;

/// The lifecycle capabilities a bridge needs from its owner.
pub trait BridgeHost {
    /// Register `cleanup` to run exactly once when the owner goes away.
    fn on_scope_dispose(&mut self, cleanup: Box<dyn FnOnce()>);

    /// Called with every container handed out for this owner.
    ///
    /// Hosts that re-render on change subscribe here. Does nothing by default.
    fn watch_container<T: 'static>(&mut self, container: &ReadOnlySignal<T>) {
        let _ = container;
    }
}

impl BridgeHost for Scope {
    fn on_scope_dispose(&mut self, cleanup: Box<dyn FnOnce()>) {
        self.on_cleanup(cleanup);
    }
}

/// Extension trait exposing the bridge entry points on any [`BridgeHost`].
///
/// ```rust,no_run
/// use observable_bridge::observable::Observable;
/// use observable_bridge::prelude::*;
///
/// let count = Observable::new(0);
/// let mut scope = Scope::new("counter");
/// let doubled = {
///     let count = count.clone();
///     scope.use_observed_transform(move || count.get(), |n| n * 2)
/// };
/// count.set(21);
/// assert_eq!(doubled.get(), 42);
/// ```
pub trait ObservedContext: BridgeHost + Sized {
    /// See [`bridge::use_observed_value`].
    fn use_observed_value<T>(&mut self, selector: impl Fn() -> T + 'static) -> ReadOnlySignal<T>
    where
        T: PartialEq + Clone + 'static,
    {
        bridge::use_observed_value(self, selector)
    }

    /// See [`bridge::use_observed_transform`].
    fn use_observed_transform<T, E>(
        &mut self,
        selector: impl Fn() -> T + 'static,
        projector: impl Fn(&T) -> E + 'static,
    ) -> ReadOnlySignal<E>
    where
        T: PartialEq + 'static,
        E: 'static,
    {
        bridge::use_observed_transform(self, selector, projector)
    }

    /// See [`bridge::use_auto_observed_value`].
    fn use_auto_observed_value<T>(
        &mut self,
        selector: impl Fn() -> T + 'static,
    ) -> ReadOnlySignal<T>
    where
        T: 'static,
    {
        bridge::use_auto_observed_value(self, selector)
    }
}

impl<H: BridgeHost> ObservedContext for H {}

#[cfg(feature = "gpui")]
mod gpui_host {
    use super::BridgeHost;
    use crate::signal::ReadOnlySignal;
    use futures::channel::mpsc;
    use futures::StreamExt;
    use gpui::WeakEntity;

    impl<V: 'static> BridgeHost for gpui::Context<'_, V> {
        fn on_scope_dispose(&mut self, cleanup: Box<dyn FnOnce()>) {
            self.on_release(move |_, _| cleanup()).detach();
        }

        fn watch_container<T: 'static>(&mut self, container: &ReadOnlySignal<T>) {
            auto_notify(container, self);
        }
    }

    /// Notify the entity whenever `container` is written.
    ///
    /// The signal callback only queues a message; the entity is updated on the
    /// foreground executor. The task ends once the entity is released.
    fn auto_notify<T, V>(container: &ReadOnlySignal<T>, cx: &mut gpui::Context<V>)
    where
        T: 'static,
        V: 'static,
    {
        let (tx, mut rx) = mpsc::unbounded::<()>();

        container.subscribe(move || {
            // Ignore errors - if the receiver is dropped, the entity is gone
            let _ = tx.unbounded_send(());
        });

        cx.spawn(
            async move |entity: WeakEntity<V>, cx: &mut gpui::AsyncApp| {
                while let Some(()) = rx.next().await {
                    let Some(entity) = entity.upgrade() else {
                        break;
                    };
                    entity
                        .update(cx, |_, cx| {
                            cx.notify();
                        })
                        .ok();
                }
            },
        )
        .detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Observable;
    use std::cell::Cell;
    use std::rc::Rc;

    struct RecordingHost {
        cleanups: Vec<Box<dyn FnOnce()>>,
        watched: Rc<Cell<usize>>,
    }

    impl BridgeHost for RecordingHost {
        fn on_scope_dispose(&mut self, cleanup: Box<dyn FnOnce()>) {
            self.cleanups.push(cleanup);
        }

        fn watch_container<T: 'static>(&mut self, _container: &ReadOnlySignal<T>) {
            self.watched.set(self.watched.get() + 1);
        }
    }

    #[test]
    fn test_extension_methods_on_scope() {
        let count = Observable::new(2);
        let mut scope = Scope::new("ext");
        let tripled = {
            let count = count.clone();
            scope.use_observed_transform(move || count.get(), |n| n * 3)
        };
        let auto = {
            let count = count.clone();
            scope.use_auto_observed_value(move || count.get() + 1)
        };

        count.set(4);
        assert_eq!(tripled.get(), 12);
        assert_eq!(auto.get(), 5);
        assert_eq!(scope.pending_cleanups(), 2);
    }

    #[test]
    fn test_custom_host_sees_every_container() {
        let watched = Rc::new(Cell::new(0));
        let mut host = RecordingHost {
            cleanups: Vec::new(),
            watched: watched.clone(),
        };
        let count = Observable::new(0);
        let value = {
            let count = count.clone();
            host.use_observed_value(move || count.get())
        };
        assert_eq!(watched.get(), 1);
        assert_eq!(host.cleanups.len(), 1);

        for cleanup in host.cleanups.drain(..) {
            cleanup();
        }
        count.set(1);
        assert_eq!(value.get(), 0);
    }
}
