//! Runtime configuration.

use serde::{Deserialize, Serialize};

/// Default number of times a single job may run within one flush.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// Tunables for a [`Runtime`](crate::reactive::Runtime).
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```rust
/// use ripple_core::RuntimeConfig;
///
/// let config = RuntimeConfig::from_json(r#"{ "recursion_limit": 10 }"#).unwrap();
/// assert_eq!(config.recursion_limit, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many times one job may run in a single flush before the flush is
    /// aborted with [`SchedulerError::RecursiveUpdate`](crate::SchedulerError).
    pub recursion_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RuntimeConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(RuntimeConfig::from_json(r#"{ "recursion_limit": "many" }"#).is_err());
    }
}
