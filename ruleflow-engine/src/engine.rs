//! The rule engine: one compiled chain plus its submission surface.

use crate::dispatch::Traversal;
use crate::dsl::{ChainDef, ChainParser, JsonParser, NodeDef};
use crate::error::{ChainError, Result};
use crate::graph::ChainGraph;
use crate::pool::PoolCore;
use arc_swap::ArcSwapOption;
use ruleflow_core::{EndFn, EngineConfig, Message, RuleError, ShareContext};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::Notify;

/// Per-submission overrides.
#[derive(Clone, Default)]
pub struct SubmitOptions {
    pub(crate) end_fn: Option<EndFn>,
    pub(crate) share: Option<ShareContext>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Completion callback for this submission, overriding the engine
    /// default.
    pub fn with_end_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message, Option<&RuleError>) + Send + Sync + 'static,
    {
        self.end_fn = Some(Arc::new(f));
        self
    }

    /// Share context attached to the traversal, e.g. to carry values or a
    /// cancellation handle.
    pub fn with_share_context(mut self, share: ShareContext) -> Self {
        self.share = Some(share);
        self
    }
}

/// State shared between the engine handle, its traversals, and its timers.
pub(crate) struct EngineShared {
    pub(crate) id: String,
    pub(crate) config: Arc<EngineConfig>,
    pub(crate) parser: Arc<dyn ChainParser + Send + Sync>,
    /// The live graph. `None` once the engine stopped, so the final drain
    /// releases every node holder.
    pub(crate) graph: ArcSwapOption<ChainGraph>,
    pub(crate) stopped: AtomicBool,
    pub(crate) inflight: AtomicUsize,
    pub(crate) drained: Notify,
    pool: RwLock<Option<Weak<PoolCore>>>,
}

impl EngineShared {
    /// Late-bound sub-chain lookup through the owning pool.
    pub(crate) fn resolve_chain(&self, chain_id: &str) -> Option<Arc<RuleEngine>> {
        let weak = self.pool.read().expect("pool lock poisoned").clone()?;
        weak.upgrade()?.get(chain_id)
    }
}

/// A compiled chain accepting concurrent message submissions.
///
/// Reload operations swap the graph pointer atomically: in-flight traversals
/// continue on the graph they started with, new submissions observe the new
/// one, and replaced node instances are destroyed when the last traversal
/// over the old graph drains.
///
/// Chains may contain cycles. Cycle-closing emissions are scheduled through
/// the worker pool (or a fresh task when none is configured); chains that
/// need paced iteration should break cycles with
/// [`RuleContext::tell_self`](ruleflow_core::RuleContext::tell_self) and a
/// non-zero delay.
pub struct RuleEngine {
    shared: Arc<EngineShared>,
}

impl RuleEngine {
    /// Compile `dsl` with the default JSON parser. An empty `id` adopts the
    /// description's `ruleChain.id`.
    pub fn new(id: &str, dsl: &[u8], config: EngineConfig) -> Result<Self> {
        Self::with_parser(id, dsl, config, Arc::new(JsonParser))
    }

    /// Compile with an alternative description format.
    pub fn with_parser(
        id: &str,
        dsl: &[u8],
        config: EngineConfig,
        parser: Arc<dyn ChainParser + Send + Sync>,
    ) -> Result<Self> {
        let def = parser.decode_chain(dsl)?;
        let config = Arc::new(config);
        let graph = ChainGraph::build(def, &config)?;
        let id = if id.is_empty() { graph.id().to_string() } else { id.to_string() };

        tracing::info!(engine = %id, chain = %graph.id(), "rule engine created");

        Ok(Self {
            shared: Arc::new(EngineShared {
                id,
                config,
                parser,
                graph: ArcSwapOption::from_pointee(graph),
                stopped: AtomicBool::new(false),
                inflight: AtomicUsize::new(0),
                drained: Notify::new(),
                pool: RwLock::new(None),
            }),
        })
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Submit fire-and-forget. The engine-default end-callback (if any)
    /// observes completion.
    pub fn on_msg(&self, msg: Message) {
        self.submit(msg, None, None);
    }

    /// Submit with per-traversal overrides.
    pub fn on_msg_with_options(&self, msg: Message, opts: SubmitOptions) {
        self.submit(msg, opts.end_fn, opts.share);
    }

    /// Submit and wait for the traversal to complete. Returns the final
    /// message together with the terminal error, if any branch failed or the
    /// traversal was cancelled.
    pub async fn on_msg_and_wait(
        &self,
        msg: Message,
        opts: SubmitOptions,
    ) -> Result<(Message, Option<RuleError>)> {
        if self.is_stopped() {
            return Err(ChainError::EngineStopped(self.id().to_string()));
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        let user_end = opts.end_fn;

        let end: EndFn = Arc::new(move |m: &Message, e: Option<&RuleError>| {
            if let Some(f) = &user_end {
                f(m, e);
            }
            if let Some(tx) = tx.lock().expect("oneshot lock poisoned").take() {
                let _ = tx.send((m.clone(), e.cloned()));
            }
        });

        self.submit(msg, Some(end), opts.share);
        rx.await.map_err(|_| ChainError::EngineStopped(self.id().to_string()))
    }

    fn submit(&self, msg: Message, end_fn: Option<EndFn>, share: Option<ShareContext>) {
        let graph = if self.is_stopped() { None } else { self.shared.graph.load_full() };

        let Some(graph) = graph else {
            tracing::warn!(engine = %self.id(), "submission refused, engine stopped");
            if let Some(f) = end_fn.or_else(|| self.shared.config.on_end.clone()) {
                f(&msg, Some(&RuleError::Stopped));
            }
            return;
        };

        let traversal = Traversal::new(self.shared.clone(), graph, end_fn);
        traversal.start(msg, share.unwrap_or_default());
    }

    /// Submission path for sub-chain composition: the caller's `end` closure
    /// always observes completion, even when the engine refuses the message.
    pub(crate) fn submit_nested(&self, msg: Message, share: ShareContext, end: EndFn) {
        let graph = if self.is_stopped() { None } else { self.shared.graph.load_full() };

        match graph {
            Some(graph) => {
                let traversal = Traversal::new(self.shared.clone(), graph, Some(end));
                traversal.start(msg, share);
            }
            None => end(&msg, Some(&RuleError::Stopped)),
        }
    }

    /// Replace the whole chain atomically. The new description fully
    /// replaces the old one — including the root node — and the old nodes
    /// are destroyed once the last in-flight traversal over them completes.
    pub fn reload_self(&self, dsl: &[u8]) -> Result<()> {
        if self.is_stopped() {
            return Err(ChainError::EngineStopped(self.id().to_string()));
        }
        let def = self.shared.parser.decode_chain(dsl)?;
        let graph = ChainGraph::build(def, &self.shared.config)?;

        tracing::info!(engine = %self.id(), chain = %graph.id(), "chain reloaded");
        self.shared.graph.store(Some(Arc::new(graph)));
        Ok(())
    }

    /// Replace a single node's definition atomically. Untouched nodes keep
    /// their instances; only the replaced one is re-initialized, and its
    /// predecessor is destroyed after the drain.
    pub fn reload_child(&self, node_id: &str, dsl: &[u8]) -> Result<()> {
        let node_def = self.shared.parser.decode_node(dsl)?;
        let current = self
            .shared
            .graph
            .load_full()
            .ok_or_else(|| ChainError::EngineStopped(self.id().to_string()))?;
        let graph = current.rebuild_with_node(node_id, node_def, &self.shared.config)?;

        tracing::info!(engine = %self.id(), node = %node_id, "node reloaded");
        self.shared.graph.store(Some(Arc::new(graph)));
        Ok(())
    }

    /// Refuse new submissions, cancel in-flight traversals, and wait for them
    /// to drain (up to the configured drain timeout). Node instances are
    /// destroyed as the drain releases them.
    pub async fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(engine = %self.id(), "stopping");
        self.shared.graph.store(None);

        let deadline = tokio::time::Instant::now() + self.shared.config.drain_timeout;
        loop {
            let drained = self.shared.drained.notified();
            if self.shared.inflight.load(Ordering::SeqCst) == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, drained).await.is_err() {
                tracing::warn!(
                    engine = %self.id(),
                    inflight = self.shared.inflight.load(Ordering::SeqCst),
                    "drain deadline reached with traversals still in flight"
                );
                break;
            }
        }
    }

    /// Re-encode the live chain definition.
    pub fn dsl(&self) -> Result<Vec<u8>> {
        let graph = self
            .shared
            .graph
            .load_full()
            .ok_or_else(|| ChainError::EngineStopped(self.id().to_string()))?;
        self.shared.parser.encode_chain(graph.def())
    }

    /// Declared node ids of the live chain, sorted.
    pub fn node_ids(&self) -> Vec<String> {
        self.shared.graph.load_full().map(|graph| graph.node_ids()).unwrap_or_default()
    }

    /// Declaration of one node of the live chain.
    pub fn node_def(&self, node_id: &str) -> Option<NodeDef> {
        self.shared
            .graph
            .load_full()
            .and_then(|graph| graph.node(node_id).map(|holder| holder.def().clone()))
    }

    /// Live chain definition.
    pub fn def(&self) -> Option<ChainDef> {
        self.shared.graph.load_full().map(|graph| graph.def().clone())
    }

    pub(crate) fn attach_pool(&self, pool: Weak<PoolCore>) {
        *self.shared.pool.write().expect("pool lock poisoned") = Some(pool);
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("id", &self.id())
            .field("stopped", &self.is_stopped())
            .field("inflight", &self.shared.inflight.load(Ordering::SeqCst))
            .finish()
    }
}
