//! # ruleflow-engine
//!
//! Chain compiler, message dispatcher, and engine pool for the ruleflow
//! rule-engine runtime.
//!
//! ## Overview
//!
//! A *rule chain* is a directed multigraph of typed nodes connected by
//! relation-labeled edges, declared in a portable JSON description. This
//! crate compiles descriptions into live graphs, routes every submitted
//! message from node to node along its relations, and keeps compiled chains
//! resident in a process-wide pool that accepts messages concurrently.
//!
//! - [`RuleEngine`] - one compiled chain: submit, wait, hot reload, stop
//! - [`EnginePool`] - id → engine map; resolves sub-chain references
//! - [`ChainGraph`] - validated topology with a `(source, relation)` index
//! - [`ChainParser`] / [`JsonParser`] - pluggable description codecs
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use ruleflow_core::{EngineConfig, DataType, Message, Metadata};
//! use ruleflow_engine::{RuleEngine, SubmitOptions};
//!
//! let config = EngineConfig::new().with_registry(registry);
//! let engine = RuleEngine::new("rule01", dsl_bytes, config)?;
//!
//! let msg = Message::new("TELEMETRY", DataType::Json, Metadata::new(), r#"{"temperature":41}"#);
//! let (out, err) = engine.on_msg_and_wait(msg, SubmitOptions::new()).await?;
//! ```

mod context;
mod dispatch;
pub mod dsl;
pub mod engine;
pub mod error;
pub mod graph;
pub mod pool;

// Re-exports
pub use dsl::{ChainDef, ChainInfo, ChainMeta, ChainParser, ConnectionDef, JsonParser, NodeDef};
pub use engine::{RuleEngine, SubmitOptions};
pub use error::{ChainError, Result};
pub use graph::{ChainGraph, NodeHolder};
pub use pool::EnginePool;
