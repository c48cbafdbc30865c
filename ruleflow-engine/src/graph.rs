//! Compiled chain topology.
//!
//! A [`ChainGraph`] is immutable after compilation. Hot reload never mutates
//! a live graph — the engine builds a replacement and swaps the pointer, so
//! in-flight traversals keep dispatching over the graph they started on.

use crate::dsl::{ChainDef, NodeDef};
use crate::error::{ChainError, Result};
use ruleflow_core::{template, ComponentKind, EngineConfig, Node, RuleNodeId};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// One node instance bound to its declaration.
///
/// Holders are reference-counted: traversals and graphs share them, and the
/// instance's `destroy` runs when the last reference drops. That is the whole
/// reload drain discipline — replaced nodes die exactly when the last
/// traversal still using them completes.
pub struct NodeHolder {
    id: RuleNodeId,
    def: NodeDef,
    node: Box<dyn Node + Send + Sync>,
}

impl NodeHolder {
    fn build(def: NodeDef, config: &EngineConfig) -> Result<Self> {
        let mut node = config.registry.new_node(&def.node_type).map_err(|err| match err {
            ruleflow_core::RuleError::NotFound(node_type) => {
                ChainError::UnknownNodeType { node: def.id.clone(), node_type }
            }
            other => ChainError::Rule(other),
        })?;

        // `${global.*}` placeholders resolve once, here. Plain `${...}`
        // placeholders stay in the configuration for dispatch-time rendering.
        let mut configuration = Value::Object(def.configuration.clone());
        template::resolve_globals(&mut configuration, &config.properties);
        let Value::Object(configuration) = configuration else { unreachable!() };

        node.init(config, &configuration)
            .map_err(|source| ChainError::NodeInit { node: def.id.clone(), source })?;

        Ok(Self { id: RuleNodeId::node(def.id.clone()), def, node })
    }

    pub fn id(&self) -> &str {
        &self.id.id
    }

    pub fn node_id(&self) -> &RuleNodeId {
        &self.id
    }

    pub fn def(&self) -> &NodeDef {
        &self.def
    }

    pub fn node(&self) -> &(dyn Node + Send + Sync) {
        self.node.as_ref()
    }

    pub fn is_debug_mode(&self) -> bool {
        self.def.debug_mode
    }

    pub fn is_async(&self) -> bool {
        self.def.async_mode
    }

    /// This node's declaration, re-encoded.
    pub fn dsl(&self) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(&self.def).map_err(ChainError::from)
    }
}

impl Drop for NodeHolder {
    fn drop(&mut self) {
        tracing::debug!(node = %self.id.id, node_type = %self.def.node_type, "destroying node");
        self.node.destroy();
    }
}

impl std::fmt::Debug for NodeHolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHolder")
            .field("id", &self.id)
            .field("type", &self.def.node_type)
            .finish()
    }
}

/// A compiled, validated chain.
pub struct ChainGraph {
    def: ChainDef,
    root_id: String,
    nodes: HashMap<String, Arc<NodeHolder>>,
    adjacency: HashMap<(String, String), Vec<RuleNodeId>>,
    back_edges: HashSet<(String, String, String)>,
}

impl ChainGraph {
    /// Compile a description: validate the topology, instantiate and
    /// initialize every node, build the adjacency index.
    pub fn build(def: ChainDef, config: &EngineConfig) -> Result<Self> {
        Self::build_reusing(def, config, &HashMap::new())
    }

    /// Compile, reusing an existing holder for every node whose declaration
    /// is unchanged. Only changed nodes are re-initialized; dropped or
    /// replaced holders destroy their instance once the last traversal
    /// releases them.
    pub(crate) fn build_reusing(
        def: ChainDef,
        config: &EngineConfig,
        reuse: &HashMap<String, Arc<NodeHolder>>,
    ) -> Result<Self> {
        Self::validate(&def)?;

        let mut nodes: HashMap<String, Arc<NodeHolder>> =
            HashMap::with_capacity(def.metadata.nodes.len());
        for node_def in &def.metadata.nodes {
            let holder = match reuse.get(&node_def.id) {
                Some(existing) if existing.def() == node_def => existing.clone(),
                _ => Arc::new(NodeHolder::build(node_def.clone(), config)?),
            };
            nodes.insert(node_def.id.clone(), holder);
        }

        let mut adjacency: HashMap<(String, String), Vec<RuleNodeId>> = HashMap::new();
        for conn in &def.metadata.connections {
            adjacency
                .entry((conn.from_id.clone(), conn.relation.clone()))
                .or_default()
                .push(RuleNodeId::node(conn.to_id.clone()));
        }
        for conn in def.metadata.rule_chain_connections.iter().flatten() {
            adjacency
                .entry((conn.from_id.clone(), conn.relation.clone()))
                .or_default()
                .push(RuleNodeId::chain(conn.to_id.clone()));
        }

        let root_id = def.metadata.nodes[0].id.clone();
        let back_edges = compute_back_edges(&root_id, &adjacency);

        Ok(Self { def, root_id, nodes, adjacency, back_edges })
    }

    fn validate(def: &ChainDef) -> Result<()> {
        if def.metadata.nodes.is_empty() {
            return Err(ChainError::EmptyChain(def.rule_chain.id.clone()));
        }

        let mut declared = HashSet::with_capacity(def.metadata.nodes.len());
        for node in &def.metadata.nodes {
            if !declared.insert(node.id.as_str()) {
                return Err(ChainError::DuplicateNode(node.id.clone()));
            }
        }

        let sub_chains: HashSet<&str> = def
            .metadata
            .rule_chain_connections
            .iter()
            .flatten()
            .map(|conn| conn.to_id.as_str())
            .collect();

        // A connection may start from a declared node or from a sub-chain id
        // (the continuation taken when that sub-chain completes); it must
        // always land on a declared node.
        for conn in &def.metadata.connections {
            if !declared.contains(conn.from_id.as_str()) && !sub_chains.contains(conn.from_id.as_str())
            {
                return Err(dangling(conn));
            }
            if !declared.contains(conn.to_id.as_str()) {
                return Err(dangling(conn));
            }
        }
        for conn in def.metadata.rule_chain_connections.iter().flatten() {
            if !declared.contains(conn.from_id.as_str()) && !sub_chains.contains(conn.from_id.as_str())
            {
                return Err(dangling(conn));
            }
        }

        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.def.rule_chain.id
    }

    pub fn name(&self) -> &str {
        &self.def.rule_chain.name
    }

    pub fn is_root_chain(&self) -> bool {
        self.def.rule_chain.root
    }

    pub fn def(&self) -> &ChainDef {
        &self.def
    }

    /// Entry node of every traversal: the first declared node.
    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn node(&self, id: &str) -> Option<&Arc<NodeHolder>> {
        self.nodes.get(id)
    }

    /// Declared node ids, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Targets of `(source, relation)`. An empty slice terminates the branch.
    pub fn next_nodes(&self, source: &str, relation: &str) -> &[RuleNodeId] {
        self.adjacency
            .get(&(source.to_string(), relation.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Whether the edge closes a cycle. Cycle-closing emissions are never
    /// dispatched inline, so a single thread of boxed futures cannot grow
    /// without bound.
    pub fn is_back_edge(&self, source: &str, relation: &str, target: &str) -> bool {
        self.back_edges.contains(&(source.to_string(), relation.to_string(), target.to_string()))
    }

    /// New graph with one node's declaration replaced; every other holder is
    /// shared with `self`.
    pub(crate) fn rebuild_with_node(
        &self,
        node_id: &str,
        node_def: NodeDef,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut def = self.def.clone();
        let slot = def
            .metadata
            .nodes
            .iter_mut()
            .find(|node| node.id == node_id)
            .ok_or_else(|| ChainError::NodeNotFound(node_id.to_string()))?;
        *slot = node_def;

        Self::build_reusing(def, config, &self.nodes)
    }
}

impl std::fmt::Debug for ChainGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainGraph")
            .field("id", &self.id())
            .field("root", &self.root_id)
            .field("nodes", &self.node_ids())
            .finish()
    }
}

fn dangling(conn: &crate::dsl::ConnectionDef) -> ChainError {
    ChainError::DanglingEdge {
        from: conn.from_id.clone(),
        to: conn.to_id.clone(),
        relation: conn.relation.clone(),
    }
}

/// Depth-first search from the root classifying back edges. Every cycle
/// reachable from the root contains at least one of them.
fn compute_back_edges(
    root: &str,
    adjacency: &HashMap<(String, String), Vec<RuleNodeId>>,
) -> HashSet<(String, String, String)> {
    // Outgoing node-kind edges grouped by source.
    let mut outgoing: HashMap<&str, Vec<(&str, &str)>> = HashMap::new();
    for ((source, relation), targets) in adjacency {
        for target in targets {
            if target.kind == ComponentKind::Node {
                outgoing.entry(source.as_str()).or_default().push((relation.as_str(), &target.id));
            }
        }
    }

    const WHITE: u8 = 0;
    const GRAY: u8 = 1;
    const BLACK: u8 = 2;

    enum Frame<'a> {
        Enter(&'a str),
        Exit(&'a str),
    }

    let mut color: HashMap<&str, u8> = HashMap::new();
    let mut back = HashSet::new();
    let mut stack = vec![Frame::Enter(root)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(node) => {
                if *color.get(node).unwrap_or(&WHITE) != WHITE {
                    continue;
                }
                color.insert(node, GRAY);
                stack.push(Frame::Exit(node));
                for &(relation, target) in outgoing.get(node).into_iter().flatten() {
                    match *color.get(target).unwrap_or(&WHITE) {
                        GRAY => {
                            back.insert((
                                node.to_string(),
                                relation.to_string(),
                                target.to_string(),
                            ));
                        }
                        WHITE => stack.push(Frame::Enter(target)),
                        _ => {}
                    }
                }
            }
            Frame::Exit(node) => {
                color.insert(node, BLACK);
            }
        }
    }

    back
}
