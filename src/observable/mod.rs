//! A small MobX-style observable graph.
//!
//! - [`Observable`] holds a tracked value.
//! - [`Computed`] derives a value from others.
//! - [`reaction`] runs an effect when the result of an expression changes.
//! - [`autorun`] re-runs a body whenever anything it read changes.
//! - [`transaction`] batches writes so reactions run once with the final state.
//!
//! Everything is thread-local and synchronous: reactions run inside the write (or
//! at the end of the outermost transaction) that made them stale. A panic inside a
//! scheduled run is caught, logged and reported to [`on_reaction_error`] handlers,
//! and the other reactions keep running.

mod computed;
mod config;
mod reaction;
mod runtime;
mod value;

pub use computed::Computed;
pub use config::{config, configure, GraphConfig};
pub use reaction::{
    autorun, autorun_named, on_reaction_error, reaction, transaction, Disposer, ErrorHandlerGuard,
    ReactionOptions,
};
pub use runtime::{in_transaction, untracked, AtomId, HandlerId, ReactionId};
pub use value::Observable;
