//! The engine-side [`RuleContext`] implementation.
//!
//! One [`NodeContext`] exists per node execution. Emissions delegate to the
//! traversal's router; the share context is snapshotted at emission time, so
//! `set_share_context` is visible to downstream nodes of the same branch and
//! to nothing else.

use crate::dispatch::Traversal;
use crate::graph::NodeHolder;
use async_trait::async_trait;
use ruleflow_core::{
    relation, DataType, EndFn, EngineConfig, FlowDirection, Message, Metadata, RuleContext,
    RuleError, ShareContext, TaskFuture,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct NodeContext {
    traversal: Arc<Traversal>,
    holder: Arc<NodeHolder>,
    share: Mutex<ShareContext>,
    emissions: AtomicUsize,
}

impl NodeContext {
    pub(crate) fn new(
        traversal: Arc<Traversal>,
        holder: Arc<NodeHolder>,
        share: ShareContext,
    ) -> Self {
        Self { traversal, holder, share: Mutex::new(share), emissions: AtomicUsize::new(0) }
    }

    /// Number of emissions this node execution performed so far.
    pub(crate) fn emissions(&self) -> usize {
        self.emissions.load(Ordering::SeqCst)
    }

    fn share_snapshot(&self) -> ShareContext {
        self.share.lock().expect("share lock poisoned").clone()
    }

    pub(crate) async fn emit(&self, msg: Message, rel: &str, err: Option<RuleError>) {
        self.emissions.fetch_add(1, Ordering::SeqCst);
        let share = self.share_snapshot();
        // The debug sink observes the emission before any downstream node is
        // scheduled.
        self.traversal.debug(&self.holder, FlowDirection::Out, &msg, rel, err.as_ref());
        self.traversal.clone().route(self.holder.id(), &share, msg, rel, err).await;
    }
}

#[async_trait]
impl RuleContext for NodeContext {
    async fn tell_success(&self, msg: Message) {
        self.emit(msg, relation::SUCCESS, None).await;
    }

    async fn tell_failure(&self, msg: Message, err: RuleError) {
        self.emit(msg, relation::FAILURE, Some(err)).await;
    }

    async fn tell_next(&self, msg: Message, relations: &[&str]) {
        for rel in relations {
            self.emit(msg.clone(), rel, None).await;
        }
    }

    fn tell_self(&self, msg: Message, delay_ms: u64) {
        self.traversal.tell_self(self.holder.clone(), msg, delay_ms);
    }

    fn new_msg(&self, msg_type: &str, metadata: Metadata, data: String) -> Message {
        Message::new(msg_type, DataType::Json, metadata, data)
    }

    fn submit_task(&self, task: TaskFuture) {
        self.traversal.schedule(task);
    }

    fn set_end_fn(&self, f: EndFn) {
        self.traversal.set_end_fn(f);
    }

    fn end_fn(&self) -> Option<EndFn> {
        self.traversal.end_fn()
    }

    fn set_share_context(&self, ctx: ShareContext) {
        *self.share.lock().expect("share lock poisoned") = ctx;
    }

    fn share_context(&self) -> ShareContext {
        self.share_snapshot()
    }

    fn self_id(&self) -> String {
        self.holder.id().to_string()
    }

    fn config(&self) -> &EngineConfig {
        &self.traversal.shared.config
    }
}
