//! # ruleflow-components
//!
//! Built-in node components for the ruleflow rule-engine.
//!
//! | Type | Behavior |
//! |---|---|
//! | `transform` | Rewrite metadata/data/type using `${...}` templates |
//! | `fieldFilter` | Route `True`/`False` on presence of data/metadata keys |
//! | `msgTypeSwitch` | Emit on a relation named after the message type |
//! | `delay` | Buffer a message for a period, bounded by a pending quota |
//! | `log` | Render a template and write it to the `tracing` sink |
//!
//! Call [`register_builtins`] to make all of them available to a registry:
//!
//! ```rust,ignore
//! let registry = Arc::new(Registry::new());
//! ruleflow_components::register_builtins(&registry)?;
//! let config = EngineConfig::new().with_registry(registry);
//! ```

pub mod delay;
pub mod filter;
pub mod log;
pub mod transform;

#[cfg(test)]
pub(crate) mod testutil;

use ruleflow_core::{Registry, Result};

// Re-exports
pub use delay::DelayNode;
pub use filter::{FieldFilterNode, MsgTypeSwitchNode};
pub use log::LogNode;
pub use transform::TransformNode;

/// Register every built-in component on `registry`.
pub fn register_builtins(registry: &Registry) -> Result<()> {
    registry.register(Box::new(TransformNode::default()))?;
    registry.register(Box::new(FieldFilterNode::default()))?;
    registry.register(Box::new(MsgTypeSwitchNode::default()))?;
    registry.register(Box::new(DelayNode::default()))?;
    registry.register(Box::new(LogNode::default()))?;
    Ok(())
}
