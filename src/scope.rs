//! Owner scopes with one-shot teardown callbacks.

use std::fmt;

/// A component-like owner whose teardown runs every registered cleanup exactly once.
///
/// Cleanups run in registration order, either from [`Scope::dispose`] or when the
/// scope is dropped. Signals created while the scope is alive are not freed; they
/// keep their last value.
///
/// ```rust,no_run
/// use observable_bridge::Scope;
///
/// let mut scope = Scope::new("counter");
/// scope.on_cleanup(|| println!("unmounted"));
/// scope.dispose();
/// ```
pub struct Scope {
    name: String,
    cleanups: Vec<Box<dyn FnOnce()>>,
}

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cleanups: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a callback to run when the scope ends.
    pub fn on_cleanup(&mut self, cleanup: impl FnOnce() + 'static) {
        self.cleanups.push(Box::new(cleanup));
    }

    /// Number of cleanups waiting for teardown.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanups.len()
    }

    /// End the scope, running every registered cleanup.
    pub fn dispose(mut self) {
        self.run_cleanups();
    }

    fn run_cleanups(&mut self) {
        if self.cleanups.is_empty() {
            return;
        }
        tracing::debug!(scope = %self.name, cleanups = self.cleanups.len(), "disposing scope");
        for cleanup in std::mem::take(&mut self.cleanups) {
            cleanup();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.run_cleanups();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("name", &self.name)
            .field("pending_cleanups", &self.cleanups.len())
            .finish()
    }
}
