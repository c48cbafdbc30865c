//! The per-message dispatcher.
//!
//! A [`Traversal`] is one message's walk through a chain, possibly fanning
//! out into parallel branches. It owns the outstanding-branch counter, the
//! terminal resolution, and the end-callback, and it pins the graph it
//! started on so hot reload never changes topology under a walk in progress.

use crate::engine::EngineShared;
use crate::graph::{ChainGraph, NodeHolder};
use ruleflow_core::{
    relation, ComponentKind, EndFn, FlowDirection, Message, RuleError, ShareContext, TaskFuture,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::context::NodeContext;

pub(crate) struct Traversal {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) graph: Arc<ChainGraph>,
    /// Outstanding branches: node executions scheduled but not yet resolved.
    pending: AtomicUsize,
    ended: AtomicBool,
    /// Last terminal resolution; handed to the end-callback when `pending`
    /// returns to zero.
    last: Mutex<Option<(Message, Option<RuleError>)>>,
    end_fn: Mutex<Option<EndFn>>,
}

impl Traversal {
    pub(crate) fn new(
        shared: Arc<EngineShared>,
        graph: Arc<ChainGraph>,
        end_fn: Option<EndFn>,
    ) -> Arc<Self> {
        shared.inflight.fetch_add(1, Ordering::SeqCst);
        Arc::new(Self {
            shared,
            graph,
            pending: AtomicUsize::new(0),
            ended: AtomicBool::new(false),
            last: Mutex::new(None),
            end_fn: Mutex::new(end_fn),
        })
    }

    /// Kick off the walk at the chain's root node. Never blocks the caller.
    pub(crate) fn start(self: Arc<Self>, msg: Message, share: ShareContext) {
        let root = self.graph.root_id().to_string();
        let Some(holder) = self.graph.node(&root).cloned() else {
            // Unreachable for a compiled graph; resolve the submission anyway.
            self.record_terminal(msg, Some(RuleError::node(root, "root node missing")));
            self.pending.fetch_add(1, Ordering::SeqCst);
            self.complete_branch();
            return;
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        let task = self.clone().run_node_task(holder, msg, share);
        self.schedule(task);
    }

    /// Box `run_node`'s future behind a named, explicitly-typed boundary.
    ///
    /// `run_node` recurses into itself through `emit` -> `route`, so a plain
    /// `Box::pin(async move { ... })` at each call site makes the compiler
    /// re-derive `run_node`'s `Send`-ness through the whole cycle. Going
    /// through this function's declared `TaskFuture` return type gives the
    /// solver a fixed point to stop at.
    fn run_node_task(
        self: Arc<Self>,
        holder: Arc<NodeHolder>,
        msg: Message,
        share: ShareContext,
    ) -> TaskFuture {
        Box::pin(async move {
            self.run_node(holder, msg, share).await;
        })
    }

    pub(crate) fn is_cancelled(&self, share: &ShareContext) -> bool {
        self.shared.stopped.load(Ordering::SeqCst) || share.is_cancelled()
    }

    pub(crate) fn set_end_fn(&self, f: EndFn) {
        *self.end_fn.lock().expect("end_fn lock poisoned") = Some(f);
    }

    pub(crate) fn end_fn(&self) -> Option<EndFn> {
        self.end_fn.lock().expect("end_fn lock poisoned").clone()
    }

    pub(crate) fn record_terminal(&self, msg: Message, err: Option<RuleError>) {
        *self.last.lock().expect("terminal lock poisoned") = Some((msg, err));
    }

    /// Resolve one outstanding branch; the last one fires the end-callback.
    pub(crate) fn complete_branch(&self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.finish();
        }
    }

    fn finish(&self) {
        if self.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let last = self.last.lock().expect("terminal lock poisoned").take();
        let end_fn = self.end_fn().or_else(|| self.shared.config.on_end.clone());

        match (end_fn, last) {
            (Some(f), Some((msg, err))) => f(&msg, err.as_ref()),
            (_, last) => {
                tracing::debug!(
                    chain = %self.graph.id(),
                    resolved = last.is_some(),
                    "traversal finished without an end-callback"
                );
            }
        }
    }

    /// Execute one node and resolve its branch.
    pub(crate) async fn run_node(
        self: Arc<Self>,
        holder: Arc<NodeHolder>,
        msg: Message,
        share: ShareContext,
    ) {
        if self.is_cancelled(&share) {
            self.record_terminal(msg, Some(RuleError::Cancelled));
            self.complete_branch();
            return;
        }

        self.debug(&holder, FlowDirection::In, &msg, "", None);

        let ctx = Arc::new(NodeContext::new(self.clone(), holder.clone(), share.clone()));
        let dyn_ctx: Arc<dyn ruleflow_core::RuleContext> = ctx.clone();

        let result = holder.node().on_msg(dyn_ctx, msg.clone()).await;

        match result {
            // A handler error is equivalent to tell_failure; a handler that
            // already emitted gets a second, independent emission.
            Err(err) => {
                tracing::debug!(node = %holder.id(), error = %err, "handler returned error");
                ctx.emit(msg, relation::FAILURE, Some(err)).await;
            }
            Ok(()) if ctx.emissions() == 0 => {
                // Silent sink: the branch resolves with the inbound message.
                let err = self.is_cancelled(&share).then_some(RuleError::Cancelled);
                self.record_terminal(msg, err);
            }
            Ok(()) => {}
        }

        self.complete_branch();
    }

    /// Resolve an emission `(source, relation)` against the adjacency index
    /// and schedule the resulting branches.
    pub(crate) async fn route(
        self: Arc<Self>,
        source_id: &str,
        share: &ShareContext,
        msg: Message,
        rel: &str,
        err: Option<RuleError>,
    ) {
        if self.is_cancelled(share) {
            // Cancelled traversals drop emissions; the branch resolves with
            // the cancellation error.
            self.record_terminal(msg, Some(RuleError::Cancelled));
            return;
        }

        let targets = self.graph.next_nodes(source_id, rel);
        if targets.is_empty() {
            self.record_terminal(msg, err);
            return;
        }

        let fan_out = targets.len() >= 2;
        for target in targets {
            match target.kind {
                ComponentKind::Node => {
                    let Some(holder) = self.graph.node(&target.id).cloned() else {
                        tracing::warn!(node = %target.id, "edge target missing from compiled graph");
                        continue;
                    };

                    self.pending.fetch_add(1, Ordering::SeqCst);
                    let back_edge = self.graph.is_back_edge(source_id, rel, &target.id);
                    let child_msg = msg.clone();
                    let child_share = share.clone();
                    let task: TaskFuture = self.clone().run_node_task(holder, child_msg, child_share);

                    if fan_out || back_edge || self.must_schedule(&target.id) {
                        self.schedule(task);
                    } else {
                        task.await;
                    }
                }
                ComponentKind::Chain => {
                    self.pending.fetch_add(1, Ordering::SeqCst);
                    self.clone().spawn_subchain(target.id.clone(), msg.clone(), share.clone());
                }
            }
        }
    }

    fn must_schedule(&self, target_id: &str) -> bool {
        self.graph.node(target_id).map(|holder| holder.is_async()).unwrap_or(false)
    }

    /// Nested traversal over another chain resolved from the engine pool.
    /// Its completion is consumed here and re-emitted from the sub-chain id
    /// in this graph; the parent's end-callback stays in charge.
    fn spawn_subchain(self: Arc<Self>, chain_id: String, msg: Message, share: ShareContext) {
        let traversal = self.clone();
        self.schedule(Box::pin(async move {
            let engine = traversal.shared.resolve_chain(&chain_id);

            let Some(engine) = engine else {
                tracing::warn!(chain = %chain_id, "sub-chain not resident in engine pool");
                let err = RuleError::ChainNotFound(chain_id.clone());
                traversal
                    .clone()
                    .route(&chain_id, &share, msg, relation::FAILURE, Some(err))
                    .await;
                traversal.complete_branch();
                return;
            };

            let parent = traversal.clone();
            let source = chain_id.clone();
            let parent_share = share.clone();
            let end: EndFn = Arc::new(move |m: &Message, e: Option<&RuleError>| {
                let parent = parent.clone();
                let source = source.clone();
                let parent_share = parent_share.clone();
                let m = m.clone();
                let e = e.cloned();
                tokio::spawn(async move {
                    let rel = if e.is_some() { relation::FAILURE } else { relation::SUCCESS };
                    parent.clone().route(&source, &parent_share, m, rel, e).await;
                    parent.complete_branch();
                });
            });

            engine.submit_nested(msg, share, end);
        }));
    }

    /// Delayed re-entry into the current node: a wall-clock timer followed by
    /// a fresh traversal with its own branch counter, the engine-default
    /// end-callback, and a fresh share context.
    pub(crate) fn tell_self(&self, holder: Arc<NodeHolder>, msg: Message, delay_ms: u64) {
        let shared = self.shared.clone();
        let graph = self.graph.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if shared.stopped.load(Ordering::SeqCst) {
                tracing::debug!(node = %holder.id(), "dropping delayed self-message, engine stopped");
                return;
            }
            let traversal = Traversal::new(shared, graph, None);
            traversal.pending.fetch_add(1, Ordering::SeqCst);
            traversal.clone().run_node(holder, msg, ShareContext::new()).await;
        });
    }

    /// Run a task on the worker pool; fall back to a fresh task so a full
    /// pool never stalls the traversal.
    pub(crate) fn schedule(&self, task: TaskFuture) {
        match &self.shared.config.pool {
            Some(pool) => {
                if let Err(rejected) = pool.submit(task) {
                    tracing::warn!(reason = %rejected.reason, "worker pool rejected task, spawning directly");
                    tokio::spawn(rejected.task);
                }
            }
            None => {
                tokio::spawn(task);
            }
        }
    }

    pub(crate) fn debug(
        &self,
        holder: &NodeHolder,
        direction: FlowDirection,
        msg: &Message,
        rel: &str,
        err: Option<&RuleError>,
    ) {
        if !holder.is_debug_mode() {
            return;
        }
        if let Some(on_debug) = &self.shared.config.on_debug {
            on_debug(direction, holder.id(), msg, rel, err);
        }
    }
}

impl Drop for Traversal {
    fn drop(&mut self) {
        self.shared.inflight.fetch_sub(1, Ordering::SeqCst);
        self.shared.drained.notify_waiters();
    }
}
