//! Per-thread settings of the observable graph.

use super::runtime::with_runtime;

/// Tunables of the observable graph on the current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphConfig {
    /// Rounds a single flush may run before it is abandoned as unstable.
    pub max_reaction_iterations: usize,
    /// Re-raise reaction panics (after logging and reporting them) instead of
    /// isolating them.
    pub disable_error_boundaries: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_reaction_iterations: 100,
            disable_error_boundaries: false,
        }
    }
}

impl GraphConfig {
    pub fn with_max_reaction_iterations(mut self, iterations: usize) -> Self {
        self.max_reaction_iterations = iterations.max(1);
        self
    }

    pub fn with_error_boundaries(mut self, enabled: bool) -> Self {
        self.disable_error_boundaries = !enabled;
        self
    }
}

/// Replace the configuration of the current thread's graph.
pub fn configure(config: GraphConfig) {
    tracing::debug!(?config, "configuring observable graph");
    with_runtime(|runtime| runtime.config = config);
}

/// The configuration of the current thread's graph.
pub fn config() -> GraphConfig {
    with_runtime(|runtime| runtime.config.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configure_round_trips() {
        assert_eq!(config(), GraphConfig::default());

        let custom = GraphConfig::default()
            .with_max_reaction_iterations(0)
            .with_error_boundaries(false);
        configure(custom.clone());

        assert_eq!(config().max_reaction_iterations, 1);
        assert!(config().disable_error_boundaries);
    }
}
