//! The declarative chain description and its parsers.
//!
//! The default wire format is JSON:
//!
//! ```json
//! {
//!   "ruleChain": { "id": "rule01", "name": "telemetry", "root": true },
//!   "metadata": {
//!     "nodes": [
//!       { "id": "s1", "type": "transform", "configuration": { ... } },
//!       { "id": "s2", "type": "log", "debugMode": true, "configuration": { ... } }
//!     ],
//!     "connections": [
//!       { "fromId": "s1", "toId": "s2", "type": "Success" }
//!     ],
//!     "ruleChainConnections": [
//!       { "fromId": "s1", "toId": "subChain01", "type": "Failure" }
//!     ]
//!   }
//! }
//! ```
//!
//! `connections` target declared nodes; `ruleChainConnections` target other
//! chains resident in the engine pool. The `type` of a connection is its
//! relation label.

use crate::error::{ChainError, Result};
use ruleflow_core::Configuration;
use serde::{Deserialize, Serialize};

/// A full chain description.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDef {
    pub rule_chain: ChainInfo,
    #[serde(default)]
    pub metadata: ChainMeta,
}

/// Chain identity block.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Root chains receive external submissions; non-root chains exist to be
    /// referenced as sub-chains.
    #[serde(default)]
    pub root: bool,
}

/// Graph payload of a chain description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainMeta {
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub connections: Vec<ConnectionDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_chain_connections: Option<Vec<ConnectionDef>>,
}

/// One node declaration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDef {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    /// Report IN/OUT events for this node to the engine's debug sink.
    #[serde(default)]
    pub debug_mode: bool,
    /// Always schedule this node through the worker pool instead of running
    /// it inline on the emitting branch.
    #[serde(default)]
    pub async_mode: bool,
    #[serde(default)]
    pub configuration: Configuration,
}

/// A labeled edge. `relation` is serialized as `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionDef {
    pub from_id: String,
    pub to_id: String,
    #[serde(rename = "type")]
    pub relation: String,
}

/// Pluggable description codec. Implement this to feed the engine a format
/// other than JSON.
pub trait ChainParser: Send + Sync {
    fn decode_chain(&self, dsl: &[u8]) -> Result<ChainDef>;
    fn decode_node(&self, dsl: &[u8]) -> Result<NodeDef>;
    fn encode_chain(&self, def: &ChainDef) -> Result<Vec<u8>>;
    fn encode_node(&self, def: &NodeDef) -> Result<Vec<u8>>;
}

/// Default JSON codec.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonParser;

impl ChainParser for JsonParser {
    fn decode_chain(&self, dsl: &[u8]) -> Result<ChainDef> {
        serde_json::from_slice(dsl).map_err(ChainError::from)
    }

    fn decode_node(&self, dsl: &[u8]) -> Result<NodeDef> {
        serde_json::from_slice(dsl).map_err(ChainError::from)
    }

    fn encode_chain(&self, def: &ChainDef) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(def).map_err(ChainError::from)
    }

    fn encode_node(&self, def: &NodeDef) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(def).map_err(ChainError::from)
    }
}
