//! Declarative message transform.
//!
//! Chain configuration example:
//!
//! ```json
//! {
//!   "id": "s1",
//!   "type": "transform",
//!   "configuration": {
//!     "metadata": { "source": "${deviceName}", "stage": "enriched" },
//!     "data": "{\"temperature\": ${temperature}}",
//!     "msgType": "ENRICHED_EVENT"
//!   }
//! }
//! ```
//!
//! Every value is a `${...}` template rendered against the message metadata
//! at dispatch time. `data` replaces the payload wholesale; `msgType`
//! rewrites the message type.

use async_trait::async_trait;
use ruleflow_core::{template, Configuration, EngineConfig, Message, Node, Result, RuleContext};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransformNodeConfig {
    /// Metadata entries to set; values are templates.
    pub metadata: BTreeMap<String, String>,
    /// Replacement payload template.
    pub data: Option<String>,
    /// Replacement message type.
    pub msg_type: Option<String>,
}

/// Rewrites metadata, payload, and type of the passing message, then emits
/// on `Success`.
#[derive(Default)]
pub struct TransformNode {
    config: TransformNodeConfig,
}

#[async_trait]
impl Node for TransformNode {
    fn node_type(&self) -> &str {
        "transform"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.config = serde_json::from_value(serde_json::Value::Object(configuration.clone()))?;
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        // Templates see the metadata as it was on entry, so entries do not
        // observe each other regardless of map order.
        let inbound = msg.metadata.clone();
        for (key, tpl) in &self.config.metadata {
            msg.metadata.put(key, template::render(tpl, &inbound));
        }
        if let Some(tpl) = &self.config.data {
            msg.data = template::render(tpl, &inbound);
        }
        if let Some(msg_type) = &self.config.msg_type {
            msg.msg_type = msg_type.clone();
        }

        ctx.tell_success(msg).await;
        Ok(())
    }
}
