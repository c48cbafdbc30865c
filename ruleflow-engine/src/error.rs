//! Compile- and load-time errors.

use ruleflow_core::RuleError;
use thiserror::Error;

/// Result type for chain compilation and engine management.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors raised while decoding, validating, or (re)loading a chain. Runtime
/// dispatch errors are [`RuleError`] and travel through end-callbacks
/// instead.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Description is structurally invalid
    #[error("invalid chain definition: {0}")]
    InvalidDsl(String),

    /// Node type has no registered component
    #[error("unknown node type '{node_type}' for node '{node}'")]
    UnknownNodeType { node: String, node_type: String },

    /// Two nodes share an id
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    /// Connection references an undeclared node
    #[error("connection references undeclared node: {from} -[{relation}]-> {to}")]
    DanglingEdge { from: String, to: String, relation: String },

    /// Chain declares no nodes
    #[error("chain '{0}' declares no nodes")]
    EmptyChain(String),

    /// Referenced node does not exist in the compiled chain
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// A node's `init` failed; compilation aborted
    #[error("node '{node}' init failed: {source}")]
    NodeInit {
        node: String,
        #[source]
        source: RuleError,
    },

    /// Engine no longer accepts work
    #[error("engine '{0}' already stopped")]
    EngineStopped(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime error surfaced during load
    #[error(transparent)]
    Rule(#[from] RuleError),
}
