//! Engine configuration shared by the compiler, the dispatcher, and every
//! node instance.

use crate::error::Result;
use crate::executor::WorkerPool;
use crate::message::Message;
use crate::registry::Registry;
use crate::RuleError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Message flow direction reported to the debug sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowDirection {
    In,
    Out,
}

impl std::fmt::Display for FlowDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::In => write!(f, "IN"),
            Self::Out => write!(f, "OUT"),
        }
    }
}

/// Traversal completion callback: final message plus the terminal error, if
/// the last branch failed or was cancelled. Invoked exactly once per
/// traversal, from an arbitrary worker.
pub type EndFn = Arc<dyn Fn(&Message, Option<&RuleError>) + Send + Sync>;

/// Debug sink: `(direction, node_id, msg, relation, err)`. `relation` is
/// empty for `IN` events.
pub type DebugFn = Arc<dyn Fn(FlowDirection, &str, &Message, &str, Option<&RuleError>) + Send + Sync>;

/// User-defined callable exposed to script-based nodes.
pub type UdfFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Engine-wide configuration.
///
/// Cheap to clone: every field is either a small map or an `Arc`.
#[derive(Clone)]
pub struct EngineConfig {
    /// Global properties, resolved into node configurations once at `init`
    /// via `${global.<key>}` placeholders.
    pub properties: BTreeMap<String, String>,
    /// Component registry consulted while compiling chains.
    pub registry: Arc<Registry>,
    /// Worker pool backing fan-out scheduling and `submit_task`.
    pub pool: Option<Arc<dyn WorkerPool + Send + Sync>>,
    /// Debug sink, invoked for nodes with `debugMode` enabled.
    pub on_debug: Option<DebugFn>,
    /// Default end-callback for submissions that do not override it.
    pub on_end: Option<EndFn>,
    /// How long `stop` waits for in-flight traversals to drain.
    pub drain_timeout: Duration,
    udfs: BTreeMap<String, UdfFn>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            properties: BTreeMap::new(),
            registry: Arc::new(Registry::default()),
            pool: None,
            on_debug: None,
            on_end: None,
            drain_timeout: Duration::from_secs(10),
            udfs: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn WorkerPool + Send + Sync>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_on_debug<F>(mut self, f: F) -> Self
    where
        F: Fn(FlowDirection, &str, &Message, &str, Option<&RuleError>) + Send + Sync + 'static,
    {
        self.on_debug = Some(Arc::new(f));
        self
    }

    pub fn with_on_end<F>(mut self, f: F) -> Self
    where
        F: Fn(&Message, Option<&RuleError>) + Send + Sync + 'static,
    {
        self.on_end = Some(Arc::new(f));
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Register a user-defined callable under `name`. Later registrations
    /// replace earlier ones.
    pub fn register_udf<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.udfs.insert(name.into(), Arc::new(f));
    }

    pub fn udf(&self, name: &str) -> Option<UdfFn> {
        self.udfs.get(name).cloned()
    }

    pub fn udf_names(&self) -> Vec<String> {
        self.udfs.keys().cloned().collect()
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("properties", &self.properties)
            .field("pool", &self.pool.is_some())
            .field("on_debug", &self.on_debug.is_some())
            .field("on_end", &self.on_end.is_some())
            .field("drain_timeout", &self.drain_timeout)
            .field("udfs", &self.udfs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_property("endpoint", "mqtt://localhost")
            .with_drain_timeout(Duration::from_secs(1));

        assert_eq!(config.properties.get("endpoint").map(String::as_str), Some("mqtt://localhost"));
        assert_eq!(config.drain_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_udf_registration() {
        let mut config = EngineConfig::new();
        config.register_udf("add", |args| {
            let a = args.first().and_then(Value::as_i64).unwrap_or(0);
            let b = args.get(1).and_then(Value::as_i64).unwrap_or(0);
            Ok(json!(a + b))
        });

        let add = config.udf("add").unwrap();
        assert_eq!(add(&[json!(1), json!(5)]).unwrap(), json!(6));
        assert!(config.udf("missing").is_none());
    }

    #[test]
    fn test_flow_direction_display() {
        assert_eq!(FlowDirection::In.to_string(), "IN");
        assert_eq!(FlowDirection::Out.to_string(), "OUT");
    }
}
