//! Exposing observable-graph values as read-only host signals.
//!
//! Each entry point seeds a host [`Signal`] from an untracked call of the selector,
//! subscribes to the observable graph so later changes are written into the signal,
//! and registers the subscription's disposal with the host's scope-end hook. The
//! caller only ever gets the [`ReadOnlySignal`] side.
//!
//! A panic from the seed call unwinds out of the entry point before the signal or
//! the subscription exist. Panics during later runs are isolated by the observable
//! graph and leave the signal at its last written value.
//!
//! Containers outlive their bridge. The host arena never frees a container slot, so
//! the slot and its plain subscriptions (a GPUI host's re-render hook included) stay
//! allocated for the life of the thread.

use crate::context::BridgeHost;
use crate::observable::{self, Disposer, ReactionOptions};
use crate::signal::{ReadOnlySignal, Signal};

/// Follow the value returned by `selector`.
///
/// The signal is rewritten only when the selector's result differs (by
/// `PartialEq`) from its previous result; writes inside one transaction produce at
/// most one update, carrying the final value.
pub fn use_observed_value<H, T>(
    host: &mut H,
    selector: impl Fn() -> T + 'static,
) -> ReadOnlySignal<T>
where
    H: BridgeHost,
    T: PartialEq + Clone + 'static,
{
    let container = Signal::new(observable::untracked(&selector));
    let disposer = observable::reaction(
        selector,
        move |value: &T| container.set(value.clone()),
        ReactionOptions::default().fire_immediately(false),
    );
    finish(host, container, disposer, "value")
}

/// Follow `projector(&selector())`.
///
/// Change detection applies to the selector's result; the projector re-runs on
/// every change and its output is written as is.
pub fn use_observed_transform<H, T, E>(
    host: &mut H,
    selector: impl Fn() -> T + 'static,
    projector: impl Fn(&T) -> E + 'static,
) -> ReadOnlySignal<E>
where
    H: BridgeHost,
    T: PartialEq + 'static,
    E: 'static,
{
    let container = Signal::new(observable::untracked(|| projector(&selector())));
    let disposer = observable::reaction(
        selector,
        move |value: &T| container.set(projector(value)),
        ReactionOptions::default().fire_immediately(false),
    );
    finish(host, container, disposer, "transform")
}

/// Follow `selector` with automatic dependency tracking.
///
/// The selector re-runs whenever anything it read on its previous run changes, and
/// every run writes the signal. The selector runs twice during this call: once
/// untracked to seed the signal, then once more as the first tracked run.
pub fn use_auto_observed_value<H, T>(
    host: &mut H,
    selector: impl Fn() -> T + 'static,
) -> ReadOnlySignal<T>
where
    H: BridgeHost,
    T: 'static,
{
    let container = Signal::new(observable::untracked(&selector));
    let disposer = observable::autorun(move || {
        let value = selector();
        // Host observers woken by the write must not become dependencies here.
        observable::untracked(|| container.set(value));
    });
    finish(host, container, disposer, "auto")
}

fn finish<H, T>(
    host: &mut H,
    container: Signal<T>,
    disposer: Disposer,
    mode: &'static str,
) -> ReadOnlySignal<T>
where
    H: BridgeHost,
    T: 'static,
{
    let signal = container.id();
    tracing::debug!(?signal, mode, "bridge created");
    host.on_scope_dispose(Box::new(move || {
        tracing::debug!(?signal, mode, "bridge disposed");
        disposer.dispose();
    }));

    let container = container.read_only();
    host.watch_container(&container);
    container
}
