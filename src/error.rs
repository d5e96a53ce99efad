//! Error types.

use crate::storage::SignalId;
use thiserror::Error;

/// Misuse of a host-side handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A write was attempted through a [`ReadOnlySignal`](crate::ReadOnlySignal).
    #[error("signal {0:?} is read-only")]
    ReadOnly(SignalId),
}

/// A failure isolated by the observable graph while running reactions.
///
/// These never propagate out of the mutation that triggered them (unless
/// [`GraphConfig::disable_error_boundaries`](crate::observable::GraphConfig) is set);
/// they are logged and handed to every handler registered with
/// [`on_reaction_error`](crate::observable::on_reaction_error).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactionError {
    /// A reaction, autorun or computed panicked while running.
    #[error("reaction `{name}` panicked: {message}")]
    Panicked { name: String, message: String },

    /// Reactions kept invalidating each other and the flush was abandoned.
    #[error("reactions did not settle after {iterations} iterations (last ran `{name}`)")]
    Unstable { iterations: usize, name: String },
}

impl ReactionError {
    /// Name of the reaction the error is attributed to.
    pub fn name(&self) -> &str {
        match self {
            Self::Panicked { name, .. } | Self::Unstable { name, .. } => name,
        }
    }
}
