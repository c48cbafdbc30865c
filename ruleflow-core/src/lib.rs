//! # ruleflow-core
//!
//! Core traits and types for the ruleflow rule-engine runtime.
//!
//! ## Overview
//!
//! This crate provides the foundational abstractions shared by the chain
//! compiler, the dispatcher, and every node component:
//!
//! - [`Message`] / [`Metadata`] - the value-copied payload flowing through a chain
//! - [`Node`] / [`RuleContext`] - the component contract and the per-message cursor
//! - [`Registry`] - maps a node type key to a prototype factory
//! - [`EngineConfig`] - engine-wide options (properties, pools, callbacks, UDFs)
//! - [`ShareContext`] - copy-on-write traversal state carrying cancellation
//! - [`WorkerPool`] - optional task executor used for fan-out scheduling
//! - [`RuleError`] / [`Result`] - unified error handling
//!
//! ## The node contract
//!
//! ```rust,ignore
//! #[async_trait]
//! pub trait Node: Send + Sync {
//!     fn node_type(&self) -> &str;
//!     fn new_instance(&self) -> Box<dyn Node>;
//!     fn init(&mut self, config: &EngineConfig, configuration: &Configuration) -> Result<()>;
//!     async fn on_msg(&self, ctx: Arc<dyn RuleContext>, msg: Message) -> Result<()>;
//!     fn destroy(&self) {}
//! }
//! ```
//!
//! Handlers receive a [`RuleContext`] and decide *what* to emit
//! (`tell_success`, `tell_failure`, `tell_next`, `tell_self`); the engine's
//! dispatcher decides *where* the message goes next.

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod message;
pub mod node;
pub mod registry;
pub mod template;

// Re-exports
pub use config::{DebugFn, EndFn, EngineConfig, FlowDirection, UdfFn};
pub use context::ShareContext;
pub use error::{Result, RuleError};
pub use executor::{RejectedTask, TaskFuture, TokioWorkerPool, WorkerPool};
pub use message::{DataType, Message, Metadata};
pub use node::{relation, ComponentKind, Configuration, Node, RuleContext, RuleNodeId};
pub use registry::Registry;
