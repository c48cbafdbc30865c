//! Shared fixtures for the engine integration tests: a handful of small test
//! components and a registry wired with them plus the built-ins.
#![allow(dead_code)]

use async_trait::async_trait;
use ruleflow_core::{
    relation, Configuration, DataType, EngineConfig, Message, Metadata, Node, Registry, Result,
    RuleContext, RuleError,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Sink = Arc<Mutex<Vec<(String, Message)>>>;

/// Everything a test needs to assemble an engine.
pub struct TestHarness {
    pub sink: Sink,
    pub destroy_count: Arc<AtomicUsize>,
    pub registry: Arc<Registry>,
}

/// Route engine tracing to the test writer. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn harness() -> TestHarness {
    init_tracing();
    let sink: Sink = Arc::default();
    let destroy_count = Arc::new(AtomicUsize::new(0));

    let registry = Registry::new();
    ruleflow_components::register_builtins(&registry).unwrap();
    registry.register(Box::new(RecorderNode { label: String::new(), sink: sink.clone() })).unwrap();
    registry.register(Box::new(DoubleFieldNode::default())).unwrap();
    registry.register(Box::new(ThresholdFilterNode::default())).unwrap();
    registry.register(Box::new(PathNode::default())).unwrap();
    registry.register(Box::new(SleepNode::default())).unwrap();
    registry.register(Box::new(ErrorNode)).unwrap();
    registry.register(Box::new(SumNode)).unwrap();
    registry.register(Box::new(DeferredNode::default())).unwrap();
    registry.register(Box::new(CycleNode::default())).unwrap();
    registry
        .register(Box::new(DestroyProbeNode {
            initialized: false,
            destroy_count: destroy_count.clone(),
        }))
        .unwrap();

    TestHarness { sink, destroy_count, registry: Arc::new(registry) }
}

impl TestHarness {
    pub fn config(&self) -> EngineConfig {
        EngineConfig::new().with_registry(self.registry.clone())
    }

    pub fn recorded_labels(&self) -> Vec<String> {
        self.sink.lock().unwrap().iter().map(|(label, _)| label.clone()).collect()
    }
}

pub fn json_msg(data: &str) -> Message {
    Message::new("TEST_MSG_TYPE", DataType::Json, Metadata::new(), data)
}

fn config_str(configuration: &Configuration, key: &str, default: &str) -> String {
    configuration.get(key).and_then(Value::as_str).unwrap_or(default).to_string()
}

fn parse_object(msg: &Message) -> std::result::Result<serde_json::Map<String, Value>, RuleError> {
    let value: Value = serde_json::from_str(&msg.data)?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(RuleError::Config("payload is not a JSON object".to_string())),
    }
}

/// Records every message it sees under a configured label, then passes it on.
pub struct RecorderNode {
    label: String,
    sink: Sink,
}

#[async_trait]
impl Node for RecorderNode {
    fn node_type(&self) -> &str {
        "test/recorder"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self { label: String::new(), sink: self.sink.clone() })
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.label = config_str(configuration, "label", "recorder");
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        self.sink.lock().unwrap().push((self.label.clone(), msg.clone()));
        ctx.tell_success(msg).await;
        Ok(())
    }
}

/// Doubles one numeric field of a JSON payload.
#[derive(Default)]
pub struct DoubleFieldNode {
    field: String,
}

#[async_trait]
impl Node for DoubleFieldNode {
    fn node_type(&self) -> &str {
        "test/double"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.field = config_str(configuration, "field", "x");
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        let mut object = match parse_object(&msg) {
            Ok(object) => object,
            Err(err) => {
                ctx.tell_failure(msg, err).await;
                return Ok(());
            }
        };
        let doubled = match object.get(&self.field) {
            Some(value) if value.is_i64() => json!(value.as_i64().unwrap_or(0) * 2),
            Some(value) if value.is_number() => json!(value.as_f64().unwrap_or(0.0) * 2.0),
            _ => {
                let err = RuleError::node(ctx.self_id(), format!("missing field {}", self.field));
                ctx.tell_failure(msg, err).await;
                return Ok(());
            }
        };
        object.insert(self.field.clone(), doubled);
        msg.data = Value::Object(object).to_string();
        ctx.tell_success(msg).await;
        Ok(())
    }
}

/// Routes `True`/`False` on a numeric comparison against a JSON field.
#[derive(Default)]
pub struct ThresholdFilterNode {
    field: String,
    gt: f64,
}

#[async_trait]
impl Node for ThresholdFilterNode {
    fn node_type(&self) -> &str {
        "test/gt"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.field = config_str(configuration, "field", "x");
        self.gt = configuration.get("gt").and_then(Value::as_f64).unwrap_or(0.0);
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        let value = match parse_object(&msg) {
            Ok(object) => object.get(&self.field).and_then(Value::as_f64).unwrap_or(f64::MIN),
            Err(err) => {
                ctx.tell_failure(msg, err).await;
                return Ok(());
            }
        };
        let rel = if value > self.gt { relation::TRUE } else { relation::FALSE };
        ctx.tell_next(msg, &[rel]).await;
        Ok(())
    }
}

/// Appends its label to the `path` metadata entry, for ordering assertions.
#[derive(Default)]
pub struct PathNode {
    label: String,
}

#[async_trait]
impl Node for PathNode {
    fn node_type(&self) -> &str {
        "test/path"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.label = config_str(configuration, "label", "?");
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        let path = match msg.metadata.get("path") {
            Some(existing) => format!("{existing},{}", self.label),
            None => self.label.clone(),
        };
        msg.metadata.put("path", path);
        ctx.tell_success(msg).await;
        Ok(())
    }
}

/// Blocks for a configured duration before passing the message on.
#[derive(Default)]
pub struct SleepNode {
    ms: u64,
}

#[async_trait]
impl Node for SleepNode {
    fn node_type(&self) -> &str {
        "test/sleep"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.ms = configuration.get("ms").and_then(Value::as_u64).unwrap_or(100);
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(self.ms)).await;
        ctx.tell_success(msg).await;
        Ok(())
    }
}

/// Fails every message by returning an error from the handler.
pub struct ErrorNode;

#[async_trait]
impl Node for ErrorNode {
    fn node_type(&self) -> &str {
        "test/error"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self)
    }

    fn init(&mut self, _config: &EngineConfig, _configuration: &Configuration) -> Result<()> {
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, _msg: Message) -> Result<()> {
        Err(RuleError::node(ctx.self_id(), "intentional failure"))
    }
}

/// Adds `sum = a + b` to a JSON payload.
pub struct SumNode;

#[async_trait]
impl Node for SumNode {
    fn node_type(&self) -> &str {
        "test/sum"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self)
    }

    fn init(&mut self, _config: &EngineConfig, _configuration: &Configuration) -> Result<()> {
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        let mut object = match parse_object(&msg) {
            Ok(object) => object,
            Err(err) => {
                ctx.tell_failure(msg, err).await;
                return Ok(());
            }
        };
        let a = object.get("a").and_then(Value::as_i64).unwrap_or(0);
        let b = object.get("b").and_then(Value::as_i64).unwrap_or(0);
        object.insert("sum".to_string(), json!(a + b));
        msg.data = Value::Object(object).to_string();
        ctx.tell_success(msg).await;
        Ok(())
    }
}

/// Defers its `Success` emission through `tell_self`.
#[derive(Default)]
pub struct DeferredNode {
    ms: u64,
}

const DEFERRED_MARKER: &str = "_deferredDone";

#[async_trait]
impl Node for DeferredNode {
    fn node_type(&self) -> &str {
        "test/deferred"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.ms = configuration.get("ms").and_then(Value::as_u64).unwrap_or(50);
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        if msg.metadata.remove(DEFERRED_MARKER).is_some() {
            ctx.tell_success(msg).await;
        } else {
            msg.metadata.put(DEFERRED_MARKER, "1");
            ctx.tell_self(msg, self.ms);
        }
        Ok(())
    }
}

/// Loops on `Success` until a counter reaches the configured limit, then
/// emits on `Done`.
#[derive(Default)]
pub struct CycleNode {
    limit: i64,
}

#[async_trait]
impl Node for CycleNode {
    fn node_type(&self) -> &str {
        "test/cycle"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self::default())
    }

    fn init(&mut self, _config: &EngineConfig, configuration: &Configuration) -> Result<()> {
        self.limit = configuration.get("limit").and_then(Value::as_i64).unwrap_or(3);
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, mut msg: Message) -> Result<()> {
        let n = msg.metadata.get("n").and_then(|v| v.parse::<i64>().ok()).unwrap_or(0) + 1;
        msg.metadata.put("n", n.to_string());
        if n < self.limit {
            ctx.tell_success(msg).await;
        } else {
            ctx.tell_next(msg, &["Done"]).await;
        }
        Ok(())
    }
}

/// Counts destroy calls, to observe the reload drain discipline.
pub struct DestroyProbeNode {
    pub initialized: bool,
    pub destroy_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for DestroyProbeNode {
    fn node_type(&self) -> &str {
        "test/destroyprobe"
    }

    fn new_instance(&self) -> Box<dyn Node + Send + Sync> {
        Box::new(Self { initialized: false, destroy_count: self.destroy_count.clone() })
    }

    fn init(&mut self, _config: &EngineConfig, _configuration: &Configuration) -> Result<()> {
        self.initialized = true;
        Ok(())
    }

    async fn on_msg(&self, ctx: Arc<dyn RuleContext + Send + Sync>, msg: Message) -> Result<()> {
        ctx.tell_success(msg).await;
        Ok(())
    }

    fn destroy(&self) {
        if self.initialized {
            self.destroy_count.fetch_add(1, Ordering::SeqCst);
        }
    }
}
