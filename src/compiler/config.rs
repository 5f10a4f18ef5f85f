//! Configuration for assertion propagation.
//!
//! The target architecture is a property of the method being compiled
//! ([`crate::ir::MethodIr::target`]), not of the configuration.

use crate::{
    assertion::{LocalScope, PropagationMode, MAX_ASSERTION_COUNT},
    Error, Result,
};

/// Configuration for the assertion-propagation passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionPropConfig {
    /// Whether facts are keyed by value number across the CFG (default) or by
    /// local slot within a statement or block.
    pub mode: PropagationMode,

    /// Table capacity per method (default: 64, the maximum).
    pub max_assertions: usize,

    /// Lifetime of local-mode facts (default: one statement).
    pub local_scope: LocalScope,

    /// Run the value-number-only constant pass before generation (global).
    pub enable_vn_constant_prop: bool,

    /// Run the copy-insertion pre-pass.
    pub enable_add_copies: bool,
}

impl Default for AssertionPropConfig {
    fn default() -> Self {
        Self {
            mode: PropagationMode::Global,
            max_assertions: MAX_ASSERTION_COUNT,
            local_scope: LocalScope::Statement,
            enable_vn_constant_prop: true,
            enable_add_copies: false,
        }
    }
}

impl AssertionPropConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Block-scoped local propagation, the way a forward morph pass uses it.
    #[must_use]
    pub fn local() -> Self {
        Self {
            mode: PropagationMode::Local,
            local_scope: LocalScope::Block,
            enable_vn_constant_prop: false,
            ..Self::default()
        }
    }

    /// Sets the propagation mode.
    #[must_use]
    pub fn with_mode(mut self, mode: PropagationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the table capacity.
    ///
    /// Values above 64 are rejected by [`AssertionPropConfig::validate`].
    #[must_use]
    pub fn with_max_assertions(mut self, max: usize) -> Self {
        self.max_assertions = max;
        self
    }

    /// Sets the lifetime of local-mode facts.
    #[must_use]
    pub fn with_local_scope(mut self, scope: LocalScope) -> Self {
        self.local_scope = scope;
        self
    }

    /// Enables or disables the value-number-only constant pass.
    #[must_use]
    pub fn with_vn_constant_prop(mut self, enable: bool) -> Self {
        self.enable_vn_constant_prop = enable;
        self
    }

    /// Enables or disables copy insertion.
    #[must_use]
    pub fn with_add_copies(mut self, enable: bool) -> Self {
        self.enable_add_copies = enable;
        self
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `max_assertions` is zero or exceeds
    /// the 64 facts an assertion set can hold.
    pub fn validate(&self) -> Result<()> {
        if self.max_assertions == 0 {
            return Err(Error::Configuration(
                "max_assertions must be at least 1".to_string(),
            ));
        }
        if self.max_assertions > MAX_ASSERTION_COUNT {
            return Err(Error::Configuration(format!(
                "max_assertions is {} but an assertion set holds at most {}",
                self.max_assertions, MAX_ASSERTION_COUNT
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AssertionPropConfig::default();
        assert_eq!(config.mode, PropagationMode::Global);
        assert_eq!(config.max_assertions, 64);
        assert!(config.enable_vn_constant_prop);
        assert!(!config.enable_add_copies);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_local_config() {
        let config = AssertionPropConfig::local();
        assert_eq!(config.mode, PropagationMode::Local);
        assert_eq!(config.local_scope, LocalScope::Block);
    }

    #[test]
    fn test_builder_pattern() {
        let config = AssertionPropConfig::new()
            .with_mode(PropagationMode::Local)
            .with_local_scope(LocalScope::Statement)
            .with_max_assertions(8)
            .with_add_copies(true);

        assert_eq!(config.mode, PropagationMode::Local);
        assert_eq!(config.max_assertions, 8);
        assert!(config.enable_add_copies);
    }

    #[test]
    fn test_capacity_validation() {
        assert!(matches!(
            AssertionPropConfig::new().with_max_assertions(65).validate(),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            AssertionPropConfig::new().with_max_assertions(0).validate(),
            Err(Error::Configuration(_))
        ));
    }
}
