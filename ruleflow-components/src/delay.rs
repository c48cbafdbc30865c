//! Bounded delay queue.
//!
//! Chain configuration example:
//!
//! ```json
//! {
//!   "id": "s2",
//!   "type": "delay",
//!   "configuration": {
//!     "periodInSeconds": 60,
//!     "maxPendingMsgs": 1000
//!   }
//! }
//! ```
//!
//! An accepted message is re-enqueued to this node via `tell_self` and emits
//! `Success` once the period elapses. While `maxPendingMsgs` messages are
//! waiting, further messages emit `Failure` immediately.
//! `periodInSecondsPattern` takes precedence over `periodInSeconds` and is
//! rendered against the message metadata at dispatch time.

use async_trait::async_trait;
use ruleflow_core::{
    template, Configuration, EngineConfig, Message, Node, Result, RuleContext, RuleError,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

// Metadata marker distinguishing the delayed re-entry from a fresh message.
const QUEUED_MARKER: &str = "_delayNodeQueued";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DelayNodeConfig {
    pub period_in_seconds: i64,
    pub max_pending_msgs: i64,
    /// `${...}` template resolved against metadata per message.
    pub period_in_seconds_pattern: Option<String>,
}

impl Default for DelayNodeConfig {
    fn default() -> Self {
        Self { period_in_seconds: 60, max_pending_msgs: 1000, period_in_seconds_pattern: None }
    }
}

/// Holds each message for a period, with a bounded pending queue.
#[derive(Default)]
pub struct DelayNode {
    config: DelayNodeConfig,
    pending: AtomicI64,
}

impl DelayNode {
    fn period_seconds(&self, msg: &Message) -> std::result::Result<i64, RuleError> {
        let period = match &self.config.period_in_seconds_pattern {
            Some(pattern) => {
                let rendered = template::render(pattern, &msg.metadata);
                rendered.trim().parse::<i64>().map_err(|_| {
                    RuleError::Config(format!(
                        "period pattern resolved to '{rendered}', not a number"
                    ))
                })?
            }
            None => self.config.period_in_seconds,
        };
        if period < 0 {
            return Err(RuleError::Config(format!("period must be non-negative, got {period}")));
        }
        Ok(period)
    }
}

#[async_trait]
impl Node for DelayNode {
    fn node_type(&self) -> &str {
        "delay"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.config = serde_json::from_value(serde_json::Value::Object(configuration.clone()))?;
        if self.config.max_pending_msgs < 1 {
            return Err(RuleError::Config("maxPendingMsgs must be at least 1".to_string()));
        }
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        // Delayed re-entry: the slot drains and the message moves on.
        if msg.metadata.remove(QUEUED_MARKER).is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            ctx.tell_success(msg).await;
            return Ok(());
        }

        let period = match self.period_seconds(&msg) {
            Ok(period) => period,
            Err(err) => {
                ctx.tell_failure(msg, err).await;
                return Ok(());
            }
        };

        let prior = self.pending.fetch_add(1, Ordering::SeqCst);
        if prior >= self.config.max_pending_msgs {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            ctx.tell_failure(msg, RuleError::node(ctx.self_id(), "delay queue is full")).await;
            return Ok(());
        }

        msg.metadata.put(QUEUED_MARKER, "1");
        ctx.tell_self(msg, (period * 1000) as u64);
        Ok(())
    }
}
