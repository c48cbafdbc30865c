//! Templated tracing sink.

use async_trait::async_trait;
use ruleflow_core::{template, Configuration, EngineConfig, Message, Node, Result, RuleContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogNodeConfig {
    /// `${...}` template rendered against the message metadata. Empty logs
    /// the raw payload.
    pub template: String,
}

/// Writes one line per message to the `tracing` sink and passes the message
/// through on `Success`.
#[derive(Default)]
pub struct LogNode {
    config: LogNodeConfig,
}

#[async_trait]
impl Node for LogNode {
    fn node_type(&self) -> &str {
        "log"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.config = serde_json::from_value(serde_json::Value::Object(configuration.clone()))?;
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        let line = if self.config.template.is_empty() {
            msg.data.clone()
        } else {
            template::render(&self.config.template, &msg.metadata)
        };
        tracing::info!(
            target: "ruleflow::components::log",
            msg_id = %msg.id,
            msg_type = %msg.msg_type,
            "{line}"
        );

        ctx.tell_success(msg).await;
        Ok(())
    }
}
