//! Error types shared across the ruleflow crates.

use thiserror::Error;

/// Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Runtime errors raised while a message traverses a chain.
///
/// The enum is `Clone` on purpose: end-callbacks and debug sinks receive the
/// error alongside the message and frequently need to own it (send it over a
/// channel, stash it in a sink). All payloads are plain strings for that
/// reason.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleError {
    /// Component type already registered
    #[error("component type already registered: {0}")]
    AlreadyExists(String),

    /// Component type not registered
    #[error("component type not found: {0}")]
    NotFound(String),

    /// Node configuration is invalid
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A node handler failed
    #[error("node '{node}' failed: {message}")]
    Node { node: String, message: String },

    /// A sub-chain reference could not be resolved
    #[error("rule chain not found: {0}")]
    ChainNotFound(String),

    /// The worker pool rejected a task
    #[error("worker pool is full")]
    PoolFull,

    /// The traversal was cancelled
    #[error("traversal cancelled")]
    Cancelled,

    /// The engine no longer accepts submissions
    #[error("engine stopped")]
    Stopped,

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl RuleError {
    /// Wrap an arbitrary failure as a node-local error.
    pub fn node(node: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Node { node: node.into(), message: message.to_string() }
    }
}

impl From<serde_json::Error> for RuleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuleError::NotFound("x/missing".to_string());
        assert_eq!(err.to_string(), "component type not found: x/missing");

        let err = RuleError::node("s1", "boom");
        assert_eq!(err.to_string(), "node 's1' failed: boom");
    }

    #[test]
    fn test_error_from_serde() {
        let bad = serde_json::from_str::<serde_json::Value>("{");
        let err: RuleError = bad.unwrap_err().into();
        assert!(matches!(err, RuleError::Serialization(_)));
    }

    #[test]
    fn test_error_clone_eq() {
        let err = RuleError::PoolFull;
        assert_eq!(err.clone(), err);
    }
}
