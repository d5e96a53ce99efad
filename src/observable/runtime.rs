//! Thread-local bookkeeping of the observable graph.
//!
//! Atoms are the tracked sources (one per [`Observable`](super::Observable)), reactions
//! are the derivations that read them (reactions, autoruns and computeds). Values are
//! never stored here, only ids and re-run callbacks, so user code always runs with
//! the runtime unborrowed.
//!
//! Writes schedule the observers of the written atom. Scheduled work runs when the
//! outermost batch ends, computeds first so that reactions only ever see settled
//! derivations.

use super::config::GraphConfig;
use crate::error::ReactionError;
use slotmap::{new_key_type, SlotMap};
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

new_key_type! {
    /// Identifier of a tracked source.
    pub struct AtomId;
    /// Identifier of a reaction, autorun or computed.
    pub struct ReactionId;
    /// Identifier of a registered reaction error handler.
    pub struct HandlerId;
}

/// Re-run callback of a derivation.
pub(crate) type Runner = Rc<dyn Fn()>;

/// Listener for isolated reaction failures.
pub(crate) type ErrorListener = Rc<dyn Fn(&ReactionError)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReactionKind {
    Reaction,
    Autorun,
    Computed,
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reaction => "Reaction",
            Self::Autorun => "Autorun",
            Self::Computed => "Computed",
        })
    }
}

#[derive(Default)]
struct AtomEntry {
    observers: Vec<ReactionId>,
}

pub(crate) struct ReactionEntry {
    name: String,
    kind: ReactionKind,
    dependencies: Vec<AtomId>,
    runner: Option<Runner>,
    scheduled: bool,
}

/// Reads recorded for the derivation currently running.
struct Frame {
    reaction: ReactionId,
    observed: Vec<AtomId>,
}

pub(crate) struct GraphRuntime {
    atoms: SlotMap<AtomId, AtomEntry>,
    reactions: SlotMap<ReactionId, ReactionEntry>,
    /// `None` frames come from `untracked`.
    frames: Vec<Option<Frame>>,
    batch_depth: usize,
    pending_computeds: VecDeque<ReactionId>,
    pending_reactions: VecDeque<ReactionId>,
    flushing: bool,
    error_handlers: SlotMap<HandlerId, ErrorListener>,
    next_serial: u64,
    pub(crate) config: GraphConfig,
}

impl GraphRuntime {
    fn new() -> Self {
        Self {
            atoms: SlotMap::with_key(),
            reactions: SlotMap::with_key(),
            frames: Vec::new(),
            batch_depth: 0,
            pending_computeds: VecDeque::new(),
            pending_reactions: VecDeque::new(),
            flushing: false,
            error_handlers: SlotMap::with_key(),
            next_serial: 0,
            config: GraphConfig::default(),
        }
    }

    fn schedule(&mut self, id: ReactionId) {
        let Some(entry) = self.reactions.get_mut(id) else {
            return;
        };
        if entry.scheduled {
            return;
        }
        entry.scheduled = true;
        match entry.kind {
            ReactionKind::Computed => self.pending_computeds.push_back(id),
            ReactionKind::Reaction | ReactionKind::Autorun => self.pending_reactions.push_back(id),
        }
    }

    /// Replace the dependency set of `id` with `observed`, updating atom observer lists.
    fn bind_dependencies(&mut self, id: ReactionId, observed: Vec<AtomId>) {
        // Disposed while running.
        let Some(entry) = self.reactions.get_mut(id) else {
            return;
        };
        let previous = std::mem::replace(&mut entry.dependencies, observed);
        let current = &entry.dependencies;

        for atom in previous.iter().filter(|atom| !current.contains(atom)) {
            if let Some(atom) = self.atoms.get_mut(*atom) {
                atom.observers.retain(|observer| *observer != id);
            }
        }
        for atom in current.iter().filter(|atom| !previous.contains(atom)) {
            if let Some(atom) = self.atoms.get_mut(*atom) {
                atom.observers.push(id);
            }
        }
    }

    fn name_of(&self, id: ReactionId) -> String {
        self.reactions
            .get(id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| format!("{id:?}"))
    }
}

thread_local! {
    static RUNTIME: RefCell<GraphRuntime> = RefCell::new(GraphRuntime::new());
}

/// Access the thread-local graph runtime.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&mut GraphRuntime) -> R) -> R {
    RUNTIME.with(|runtime| f(&mut runtime.borrow_mut()))
}

/// Like [`with_runtime`], but a no-op once the thread-local has been torn down.
///
/// Used from `Drop` impls, which may run while the thread exits.
fn try_with_runtime<R>(f: impl FnOnce(&mut GraphRuntime) -> R) -> Option<R> {
    RUNTIME
        .try_with(|runtime| runtime.try_borrow_mut().ok().map(|mut runtime| f(&mut runtime)))
        .ok()
        .flatten()
}

pub(crate) fn create_atom() -> AtomId {
    with_runtime(|runtime| runtime.atoms.insert(AtomEntry::default()))
}

pub(crate) fn remove_atom(atom: AtomId) {
    try_with_runtime(|runtime| {
        if let Some(entry) = runtime.atoms.remove(atom) {
            for observer in entry.observers {
                if let Some(reaction) = runtime.reactions.get_mut(observer) {
                    reaction.dependencies.retain(|dependency| *dependency != atom);
                }
            }
        }
    });
}

/// Record a read of `atom` into the running derivation, if any.
pub(crate) fn report_observed(atom: AtomId) {
    with_runtime(|runtime| {
        if let Some(Some(frame)) = runtime.frames.last_mut() {
            if !frame.observed.contains(&atom) {
                frame.observed.push(atom);
            }
        }
    });
}

/// Schedule every observer of `atom` and flush unless a batch is open.
pub(crate) fn report_changed(atom: AtomId) {
    with_runtime(|runtime| {
        let observers = match runtime.atoms.get(atom) {
            Some(entry) => entry.observers.clone(),
            None => return,
        };
        for observer in observers {
            runtime.schedule(observer);
        }
    });
    run_pending();
}

pub(crate) fn create_reaction(name: Option<String>, kind: ReactionKind) -> ReactionId {
    with_runtime(|runtime| {
        runtime.next_serial += 1;
        let name = name.unwrap_or_else(|| format!("{kind}@{}", runtime.next_serial));
        runtime.reactions.insert(ReactionEntry {
            name,
            kind,
            dependencies: Vec::new(),
            runner: None,
            scheduled: false,
        })
    })
}

pub(crate) fn set_runner(id: ReactionId, runner: Runner) {
    with_runtime(|runtime| {
        if let Some(entry) = runtime.reactions.get_mut(id) {
            entry.runner = Some(runner);
        }
    });
}

pub(crate) fn schedule(id: ReactionId) {
    with_runtime(|runtime| runtime.schedule(id));
}

/// Remove a reaction and unlink it from everything it observed.
pub(crate) fn dispose_reaction(id: ReactionId) {
    // The entry owns user closures; drop it with the runtime released.
    let removed = try_with_runtime(|runtime| {
        let entry = runtime.reactions.remove(id)?;
        for atom in &entry.dependencies {
            if let Some(atom) = runtime.atoms.get_mut(*atom) {
                atom.observers.retain(|observer| *observer != id);
            }
        }
        tracing::trace!(reaction = %entry.name, "disposed");
        Some(entry)
    })
    .flatten();
    drop(removed);
}

/// Run `f` as the body of derivation `id`, replacing its dependencies with the
/// atoms read during this run.
///
/// Reads made before a panic still count; the frame is closed while unwinding.
pub(crate) fn track<R>(id: ReactionId, f: impl FnOnce() -> R) -> R {
    struct CloseFrame;

    impl Drop for CloseFrame {
        fn drop(&mut self) {
            with_runtime(|runtime| {
                if let Some(Some(frame)) = runtime.frames.pop() {
                    runtime.bind_dependencies(frame.reaction, frame.observed);
                }
            });
        }
    }

    with_runtime(|runtime| {
        runtime.frames.push(Some(Frame {
            reaction: id,
            observed: Vec::new(),
        }))
    });
    let _close = CloseFrame;
    f()
}

/// Run `f` without recording its reads into the running derivation.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    struct CloseFrame;

    impl Drop for CloseFrame {
        fn drop(&mut self) {
            with_runtime(|runtime| runtime.frames.pop());
        }
    }

    with_runtime(|runtime| runtime.frames.push(None));
    let _close = CloseFrame;
    f()
}

pub(crate) fn start_batch() {
    with_runtime(|runtime| runtime.batch_depth += 1);
}

/// Close a batch; the outermost one flushes pending reactions.
///
/// While unwinding the pending work is left for the next flush.
pub(crate) fn end_batch() {
    with_runtime(|runtime| runtime.batch_depth = runtime.batch_depth.saturating_sub(1));
    if !std::thread::panicking() {
        run_pending();
    }
}

/// Whether a transaction is currently open on this thread.
pub fn in_transaction() -> bool {
    with_runtime(|runtime| runtime.batch_depth > 0)
}

/// Run everything scheduled, unless a batch is open or a flush is already running.
pub(crate) fn run_pending() {
    struct EndFlush;

    impl Drop for EndFlush {
        fn drop(&mut self) {
            with_runtime(|runtime| runtime.flushing = false);
        }
    }

    let max_iterations = match with_runtime(|runtime| {
        if runtime.flushing || runtime.batch_depth > 0 {
            return None;
        }
        runtime.flushing = true;
        Some(runtime.config.max_reaction_iterations)
    }) {
        Some(max_iterations) => max_iterations,
        None => return,
    };
    let _end = EndFlush;

    let mut iterations = 0;
    loop {
        settle_computeds();
        let round: Vec<ReactionId> =
            with_runtime(|runtime| runtime.pending_reactions.drain(..).collect());
        if round.is_empty() {
            break;
        }

        iterations += 1;
        if iterations > max_iterations {
            let name = with_runtime(|runtime| {
                for id in runtime.pending_computeds.drain(..).chain(round.iter().copied()) {
                    if let Some(entry) = runtime.reactions.get_mut(id) {
                        entry.scheduled = false;
                    }
                }
                runtime.name_of(round[0])
            });
            report_error(
                ReactionError::Unstable {
                    iterations: max_iterations,
                    name,
                },
                None,
            );
            break;
        }

        let mut round = Requeue(round.into());
        while let Some(id) = round.0.pop_front() {
            settle_computeds();
            run_reaction(id);
        }
    }
}

/// Reactions of a round that have not run yet.
///
/// A rethrown reaction panic leaves the round early; whatever is left goes back to
/// the front of the queue, still marked scheduled, for the next flush.
struct Requeue(VecDeque<ReactionId>);

impl Drop for Requeue {
    fn drop(&mut self) {
        if self.0.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.0);
        try_with_runtime(|runtime| {
            for id in rest.into_iter().rev() {
                runtime.pending_reactions.push_front(id);
            }
        });
    }
}

/// Re-evaluate every scheduled computed now.
///
/// Called by the flush before each reaction, and by computed reads so a computed
/// read inside an open transaction reflects the writes made so far.
pub(crate) fn settle_computeds() {
    while let Some(id) = with_runtime(|runtime| runtime.pending_computeds.pop_front()) {
        run_reaction(id);
    }
}

fn run_reaction(id: ReactionId) {
    let Some((name, runner)) = with_runtime(|runtime| {
        let entry = runtime.reactions.get_mut(id)?;
        entry.scheduled = false;
        Some((entry.name.clone(), entry.runner.clone()?))
    }) else {
        return;
    };

    tracing::trace!(reaction = %name, "running");
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| runner())) {
        let error = ReactionError::Panicked {
            name,
            message: panic_message(payload.as_ref()),
        };
        report_error(error, Some(payload));
    }
}

/// Log `error`, hand it to every handler, then resume `payload` if error
/// boundaries are disabled.
fn report_error(error: ReactionError, payload: Option<Box<dyn Any + Send>>) {
    let (handlers, rethrow) = with_runtime(|runtime| {
        let handlers: Vec<ErrorListener> = runtime.error_handlers.values().cloned().collect();
        (handlers, runtime.config.disable_error_boundaries)
    });

    tracing::error!(reaction = %error.name(), %error, "uncaught error in reaction");
    for handler in handlers {
        handler(&error);
    }

    if rethrow {
        if let Some(payload) = payload {
            panic::resume_unwind(payload);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

pub(crate) fn add_error_handler(handler: ErrorListener) -> HandlerId {
    with_runtime(|runtime| runtime.error_handlers.insert(handler))
}

pub(crate) fn remove_error_handler(id: HandlerId) {
    let removed = try_with_runtime(|runtime| runtime.error_handlers.remove(id)).flatten();
    drop(removed);
}

#[cfg(test)]
pub(crate) fn observer_count(atom: AtomId) -> usize {
    with_runtime(|runtime| {
        runtime
            .atoms
            .get(atom)
            .map_or(0, |entry| entry.observers.len())
    })
}

#[cfg(test)]
pub(crate) fn has_atom(atom: AtomId) -> bool {
    with_runtime(|runtime| runtime.atoms.contains_key(atom))
}

#[cfg(test)]
pub(crate) fn reaction_count() -> usize {
    with_runtime(|runtime| runtime.reactions.len())
}
