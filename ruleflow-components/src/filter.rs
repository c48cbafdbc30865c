//! Routing components: presence filter and message-type switch.

use async_trait::async_trait;
use ruleflow_core::{
    relation, Configuration, DataType, EngineConfig, Message, Node, Result, RuleContext, RuleError,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

fn default_check_all_keys() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FieldFilterNodeConfig {
    /// `true`: every listed key must be present; `false`: any one suffices.
    pub check_all_keys: bool,
    /// Keys looked up in the JSON payload (top level).
    pub data_keys: Vec<String>,
    /// Keys looked up in the metadata.
    pub metadata_keys: Vec<String>,
}

impl Default for FieldFilterNodeConfig {
    fn default() -> Self {
        Self { check_all_keys: default_check_all_keys(), data_keys: vec![], metadata_keys: vec![] }
    }
}

/// Routes `True`/`False` on the presence of the configured keys. A JSON
/// payload that fails to parse routes `Failure`.
#[derive(Default)]
pub struct FieldFilterNode {
    config: FieldFilterNodeConfig,
}

impl FieldFilterNode {
    fn check(&self, msg: &Message) -> std::result::Result<bool, RuleError> {
        let data_hits: Vec<bool> = if self.config.data_keys.is_empty() {
            vec![]
        } else {
            if msg.data_type != DataType::Json {
                return Err(RuleError::Config("dataKeys require a JSON payload".to_string()));
            }
            let payload: serde_json::Value = serde_json::from_str(&msg.data)?;
            let object = payload
                .as_object()
                .ok_or_else(|| RuleError::Config("payload is not a JSON object".to_string()))?;
            self.config.data_keys.iter().map(|key| object.contains_key(key)).collect()
        };

        let metadata_hits =
            self.config.metadata_keys.iter().map(|key| msg.metadata.contains(key));

        let mut hits = data_hits.into_iter().chain(metadata_hits).peekable();
        if hits.peek().is_none() {
            // Nothing to check counts as a pass.
            return Ok(true);
        }
        Ok(if self.config.check_all_keys { hits.all(|hit| hit) } else { hits.any(|hit| hit) })
    }
}

#[async_trait]
impl Node for FieldFilterNode {
    fn node_type(&self) -> &str {
        "fieldFilter"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.config = serde_json::from_value(serde_json::Value::Object(configuration.clone()))?;
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        match self.check(&msg) {
            Ok(true) => ctx.tell_next(msg, &[relation::TRUE]).await,
            Ok(false) => ctx.tell_next(msg, &[relation::FALSE]).await,
            Err(err) => ctx.tell_failure(msg, err).await,
        }
        Ok(())
    }
}

/// Emits the message on a relation named after its type, so a chain can
/// declare one outgoing edge per expected message type.
#[derive(Default)]
pub struct MsgTypeSwitchNode;

#[async_trait]
impl Node for MsgTypeSwitchNode {
    fn node_type(&self) -> &str {
        "msgTypeSwitch"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self)
    }

    fn init(&mut self, _config: &EngineConfig, _configuration: &Configuration) -> Result<()> {
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        let msg_type = msg.msg_type.clone();
        ctx.tell_next(msg, &[msg_type.as_str()]).await;
        Ok(())
    }
}
