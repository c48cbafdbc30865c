//! The process-wide engine pool.
//!
//! Chains reference each other by id; the pool is where those references
//! resolve. Binding is late — a sub-chain may be loaded after the chains
//! that point at it.

use crate::engine::RuleEngine;
use crate::error::Result;
use ruleflow_core::{EngineConfig, Message};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Shared interior handed to engines as a weak reference, so a dropped pool
/// never keeps engines alive (nor the other way round).
pub(crate) struct PoolCore {
    engines: RwLock<HashMap<String, Arc<RuleEngine>>>,
}

impl PoolCore {
    pub(crate) fn get(&self, id: &str) -> Option<Arc<RuleEngine>> {
        self.engines.read().expect("pool lock poisoned").get(id).cloned()
    }
}

/// Id → engine map with bulk loading.
#[derive(Clone)]
pub struct EnginePool {
    core: Arc<PoolCore>,
}

impl Default for EnginePool {
    fn default() -> Self {
        Self::new()
    }
}

impl EnginePool {
    pub fn new() -> Self {
        Self { core: Arc::new(PoolCore { engines: RwLock::new(HashMap::new()) }) }
    }

    /// Compile `dsl` and add the engine to the pool. An empty `id` adopts
    /// the description's `ruleChain.id`; an id already resident returns the
    /// existing engine untouched.
    pub fn new_engine(
        &self,
        id: &str,
        dsl: &[u8],
        config: EngineConfig,
    ) -> Result<Arc<RuleEngine>> {
        if !id.is_empty() {
            if let Some(existing) = self.core.get(id) {
                return Ok(existing);
            }
        }

        let engine = Arc::new(RuleEngine::new(id, dsl, config)?);
        engine.attach_pool(Arc::downgrade(&self.core));

        let mut engines = self.core.engines.write().expect("pool lock poisoned");
        Ok(engines.entry(engine.id().to_string()).or_insert(engine).clone())
    }

    /// Load every `*.json` chain description in `folder`. Chain ids come
    /// from each file's `ruleChain.id`. Returns how many engines were
    /// created; the first failing file aborts the load.
    pub fn load(&self, folder: impl AsRef<Path>, config: &EngineConfig) -> Result<usize> {
        let mut loaded = 0;
        for entry in std::fs::read_dir(folder)? {
            let path = entry?.path();
            let is_json = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if !path.is_file() || !is_json {
                continue;
            }
            let dsl = std::fs::read(&path)?;
            self.new_engine("", &dsl, config.clone()).map_err(|err| {
                tracing::error!(path = %path.display(), error = %err, "failed to load chain");
                err
            })?;
            loaded += 1;
        }
        tracing::info!(count = loaded, "chains loaded into pool");
        Ok(loaded)
    }

    pub fn get(&self, id: &str) -> Option<Arc<RuleEngine>> {
        self.core.get(id)
    }

    /// Resident engine ids, sorted.
    pub fn engine_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> =
            self.core.engines.read().expect("pool lock poisoned").keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop and remove one engine.
    pub async fn del(&self, id: &str) {
        let removed = self.core.engines.write().expect("pool lock poisoned").remove(id);
        if let Some(engine) = removed {
            engine.stop().await;
        }
    }

    /// Stop every engine and empty the pool.
    pub async fn stop(&self) {
        let engines: Vec<Arc<RuleEngine>> = {
            let mut map = self.core.engines.write().expect("pool lock poisoned");
            map.drain().map(|(_, engine)| engine).collect()
        };
        for engine in engines {
            engine.stop().await;
        }
    }

    /// Broadcast a message to every resident engine. Each engine receives
    /// its own copy and runs its own traversal.
    pub fn on_msg(&self, msg: Message) {
        let engines: Vec<Arc<RuleEngine>> = {
            self.core.engines.read().expect("pool lock poisoned").values().cloned().collect()
        };
        for engine in engines {
            engine.on_msg(msg.clone());
        }
    }
}

impl std::fmt::Debug for EnginePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnginePool").field("engines", &self.engine_ids()).finish()
    }
}
