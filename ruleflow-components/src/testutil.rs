//! Single-node test harness.
//!
//! A [`TestRuleContext`] stands in for the engine when unit-testing one
//! component: every emission is reported to a callback together with its
//! relation, and `tell_self` re-invokes the node directly after the delay.
//! It cannot chain nodes together — integration tests in the engine crate do
//! that.

use async_trait::async_trait;
use ruleflow_core::{
    DataType, EndFn, EngineConfig, Message, Metadata, Node, RuleContext, RuleError, ShareContext,
    TaskFuture,
};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

type EmitCallback = Arc<dyn Fn(Message, String, Option<RuleError>) + Send + Sync>;

pub(crate) struct TestRuleContext {
    config: EngineConfig,
    node: Option<Arc<dyn Node + Send + Sync>>,
    callback: EmitCallback,
    share: Mutex<ShareContext>,
    end_fn: Mutex<Option<EndFn>>,
    weak_self: Weak<TestRuleContext>,
}

impl TestRuleContext {
    pub(crate) fn new<F>(config: EngineConfig, callback: F) -> Arc<Self>
    where
        F: Fn(Message, String, Option<RuleError>) + Send + Sync + 'static,
    {
        Self::build(config, None, Arc::new(callback))
    }

    /// Context bound to `node`, so `tell_self` can re-invoke it.
    pub(crate) fn with_node<F>(config: EngineConfig, node: Arc<dyn Node + Send + Sync>, callback: F) -> Arc<Self>
    where
        F: Fn(Message, String, Option<RuleError>) + Send + Sync + 'static,
    {
        Self::build(config, Some(node), Arc::new(callback))
    }

    fn build(config: EngineConfig, node: Option<Arc<dyn Node + Send + Sync>>, callback: EmitCallback) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            config,
            node,
            callback,
            share: Mutex::new(ShareContext::new()),
            end_fn: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }
}

#[async_trait]
impl RuleContext for TestRuleContext {
    async fn tell_success(&self, msg: Message) {
        (self.callback)(msg, ruleflow_core::relation::SUCCESS.to_string(), None);
    }

    async fn tell_failure(&self, msg: Message, err: RuleError) {
        (self.callback)(msg, ruleflow_core::relation::FAILURE.to_string(), Some(err));
    }

    async fn tell_next(&self, msg: Message, relations: &[&str]) {
        for rel in relations {
            (self.callback)(msg.clone(), rel.to_string(), None);
        }
    }

    fn tell_self(&self, msg: Message, delay_ms: u64) {
        let weak = self.weak_self.clone();
        let node = self.node.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let (Some(ctx), Some(node)) = (weak.upgrade(), node) {
                let dyn_ctx: Arc<dyn RuleContext + Send + Sync> = ctx;
                if let Err(err) = node.on_msg(dyn_ctx, msg).await {
                    tracing::warn!(error = %err, "self-reinjected handler failed");
                }
            }
        });
    }

    fn new_msg(&self, msg_type: &str, metadata: Metadata, data: String) -> Message {
        Message::new(msg_type, DataType::Json, metadata, data)
    }

    fn submit_task(&self, task: TaskFuture) {
        tokio::spawn(task);
    }

    fn set_end_fn(&self, f: EndFn) {
        *self.end_fn.lock().unwrap() = Some(f);
    }

    fn end_fn(&self) -> Option<EndFn> {
        self.end_fn.lock().unwrap().clone()
    }

    fn set_share_context(&self, ctx: ShareContext) {
        *self.share.lock().unwrap() = ctx;
    }

    fn share_context(&self) -> ShareContext {
        self.share.lock().unwrap().clone()
    }

    fn self_id(&self) -> String {
        "test-node".to_string()
    }

    fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Collects `(data, relation)` pairs from a context callback.
pub(crate) fn recording_sink() -> (
    Arc<Mutex<Vec<(String, String)>>>,
    impl Fn(Message, String, Option<RuleError>) + Send + Sync + 'static,
) {
    let sink: Arc<Mutex<Vec<(String, String)>>> = Arc::default();
    let records = sink.clone();
    let callback = move |msg: Message, relation: String, _err: Option<RuleError>| {
        records.lock().unwrap().push((msg.data.clone(), relation));
    };
    (sink, callback)
}
