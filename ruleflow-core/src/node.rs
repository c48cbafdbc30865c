//! The node contract and the context handed to node handlers.
//!
//! Nodes are the computational units of a chain. They receive a message and a
//! [`RuleContext`], do their work, and emit the message onward along one or
//! more relations. Nodes decide *what* to emit; the dispatcher decides
//! *where* it goes.

use crate::config::{EndFn, EngineConfig};
use crate::context::ShareContext;
use crate::error::{Result, RuleError};
use crate::executor::TaskFuture;
use crate::message::{Message, Metadata};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Predefined relation labels. Relations are opaque strings; any custom label
/// may be used alongside these.
pub mod relation {
    pub const SUCCESS: &str = "Success";
    pub const FAILURE: &str = "Failure";
    pub const TRUE: &str = "True";
    pub const FALSE: &str = "False";
}

/// Raw node configuration as declared in the chain description.
pub type Configuration = serde_json::Map<String, serde_json::Value>;

/// Whether a graph vertex is a plain node or a sub-chain reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComponentKind {
    Node,
    Chain,
}

/// Identity of a vertex inside a compiled chain.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RuleNodeId {
    pub id: String,
    pub kind: ComponentKind,
}

impl RuleNodeId {
    pub fn node(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ComponentKind::Node }
    }

    pub fn chain(id: impl Into<String>) -> Self {
        Self { id: id.into(), kind: ComponentKind::Chain }
    }
}

impl std::fmt::Display for RuleNodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ComponentKind::Node => write!(f, "{}", self.id),
            ComponentKind::Chain => write!(f, "chain:{}", self.id),
        }
    }
}

/// A rule-engine node component.
///
/// Registered prototypes act as factories: the registry calls
/// [`Node::new_instance`] once per occurrence of the type in a compiled
/// chain, so every node id owns private state. Instances are shared across
/// concurrent traversals and must tolerate concurrent `on_msg` calls.
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique component type key, e.g. `delay` or `x/upper`.
    /// A `/` namespace prefix is recommended for user components.
    fn node_type(&self) -> &str;

    /// Fresh, uninitialized instance of this component.
    fn new_instance(&self) -> Box<dyn Node + Send + Sync>;

    /// Parse configuration and acquire resources. Called exactly once per
    /// instance, before any message is dispatched to it.
    fn init(&mut self, config: &EngineConfig, configuration: &Configuration) -> Result<()>;

    /// Handle one incoming message. Returning `Err` is equivalent to having
    /// called [`RuleContext::tell_failure`]; emitting and then returning the
    /// same error is permitted and each emission is processed independently.
    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()>;

    /// Release resources. Failures must be swallowed and logged by the
    /// implementation.
    fn destroy(&self) {}
}

/// Per-message cursor handed to every node handler.
///
/// One context exists per node execution; emissions route the message to the
/// downstream nodes resolved from the chain's adjacency index.
#[async_trait]
pub trait RuleContext: Send + Sync {
    /// Emit `msg` along the `Success` relation.
    async fn tell_success(&self, msg: Message);

    /// Emit `msg` along the `Failure` relation, carrying `err`. If no
    /// `Failure` edge exists the branch terminates and the end-callback
    /// receives the error.
    async fn tell_failure(&self, msg: Message, err: RuleError);

    /// Emit `msg` along each given relation; every relation fans out
    /// independently.
    async fn tell_next(&self, msg: Message, relations: &[&str]);

    /// Re-enqueue `msg` to the current node after `delay_ms` wall-clock
    /// milliseconds. The delayed execution runs as a fresh traversal rooted
    /// at the current node: new branch counter, engine-default end-callback,
    /// fresh share context.
    fn tell_self(&self, msg: Message, delay_ms: u64);

    /// Allocate a message within the current traversal.
    fn new_msg(&self, msg_type: &str, metadata: Metadata, data: String) -> Message;

    /// Run a task on the engine's worker pool, or on a fresh task when no
    /// pool is configured (or the pool is saturated).
    fn submit_task(&self, task: TaskFuture);

    /// Register the traversal completion callback. It fires exactly once,
    /// when the last outstanding branch resolves.
    fn set_end_fn(&self, f: EndFn);

    /// Current completion callback, if any.
    fn end_fn(&self) -> Option<EndFn>;

    /// Replace the shared user context. Visible only to downstream nodes
    /// scheduled after this call, within the same branch.
    fn set_share_context(&self, ctx: ShareContext);

    /// Snapshot of the shared user context.
    fn share_context(&self) -> ShareContext;

    /// Id of the current node.
    fn self_id(&self) -> String;

    /// Engine configuration.
    fn config(&self) -> &EngineConfig;
}
