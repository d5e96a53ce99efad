//! # Observable Bridge
//!
//! Exposes values from a MobX-style [`observable`] graph as read-only host
//! signals that follow those values for as long as their owning scope lives.
//!
//! ## Features
//!
//! - **Three tracking disciplines**: [`use_observed_value`] and
//!   [`use_observed_transform`] follow the result of a selector (structural
//!   comparison, one update per transaction); [`use_auto_observed_value`] re-runs
//!   the selector whenever anything it read changes.
//! - **Read-only containers**: callers get a [`ReadOnlySignal`]; only the bridge
//!   writes the underlying [`Signal`].
//! - **Scoped lifetime**: every bridge registers exactly one disposal with its
//!   [`BridgeHost`] ([`Scope`], or a GPUI entity with the `gpui` feature), after
//!   which the container keeps its last value.
//!
//! ## Example
//!
//! ```rust,no_run
//! use observable_bridge::observable::{transaction, Observable};
//! use observable_bridge::prelude::*;
//!
//! let count = Observable::new(0);
//! let mut scope = Scope::new("counter");
//! let value = {
//!     let count = count.clone();
//!     scope.use_observed_value(move || count.get())
//! };
//!
//! transaction(|| {
//!     count.set(5);
//!     count.set(10);
//! });
//! assert_eq!(value.get(), 10);
//!
//! scope.dispose();
//! count.set(11);
//! assert_eq!(value.get(), 10);
//! ```

pub mod bridge;
mod computed;
mod context;
mod error;
pub mod observable;
mod scope;
mod signal;
mod storage;

pub use bridge::{use_auto_observed_value, use_observed_transform, use_observed_value};
pub use computed::{Effect, Memo};
pub use context::{BridgeHost, ObservedContext};
pub use error::{Error, ReactionError};
pub use scope::Scope;
pub use signal::{ReadOnlySignal, Signal};
pub use storage::SignalId;

// Re-export the prelude
pub mod prelude {
    pub use crate::{BridgeHost, Effect, Memo, ObservedContext, ReadOnlySignal, Scope, Signal};
}
