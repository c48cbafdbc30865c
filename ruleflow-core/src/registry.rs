//! Component registry: maps a node type key to a prototype able to produce
//! fresh instances.
//!
//! Registration is a setup-time operation; the registry is never mutated
//! during dispatch.

use crate::error::{Result, RuleError};
use crate::node::Node;
use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe prototype store.
#[derive(Default)]
pub struct Registry {
    components: RwLock<HashMap<String, Box<dyn Node + Send + Sync>>>,
    plugins: RwLock<HashMap<String, Vec<String>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component prototype. Fails with `AlreadyExists` when its
    /// type key is taken.
    pub fn register(&self, prototype: Box<dyn Node + Send + Sync>) -> Result<()> {
        let key = prototype.node_type().to_string();
        let mut components = self.components.write().expect("registry lock poisoned");
        if components.contains_key(&key) {
            return Err(RuleError::AlreadyExists(key));
        }
        components.insert(key, prototype);
        Ok(())
    }

    /// Register a bundle of components under a plugin name, so the whole
    /// bundle can be removed at once. Fails without side effects when the
    /// plugin name or any component type is already taken.
    pub fn register_plugin(&self, name: &str, prototypes: Vec<Box<dyn Node + Send + Sync>>) -> Result<()> {
        let mut components = self.components.write().expect("registry lock poisoned");
        let mut plugins = self.plugins.write().expect("registry lock poisoned");

        if plugins.contains_key(name) {
            return Err(RuleError::AlreadyExists(name.to_string()));
        }
        for prototype in &prototypes {
            if components.contains_key(prototype.node_type()) {
                return Err(RuleError::AlreadyExists(prototype.node_type().to_string()));
            }
        }

        let mut keys = Vec::with_capacity(prototypes.len());
        for prototype in prototypes {
            let key = prototype.node_type().to_string();
            components.insert(key.clone(), prototype);
            keys.push(key);
        }
        plugins.insert(name.to_string(), keys);
        Ok(())
    }

    /// Remove a single component by type key, or every component a plugin of
    /// that name contributed.
    pub fn unregister(&self, key: &str) -> Result<()> {
        let mut components = self.components.write().expect("registry lock poisoned");
        let mut plugins = self.plugins.write().expect("registry lock poisoned");

        if let Some(keys) = plugins.remove(key) {
            for k in keys {
                components.remove(&k);
            }
            return Ok(());
        }
        if components.remove(key).is_some() {
            return Ok(());
        }
        Err(RuleError::NotFound(key.to_string()))
    }

    /// Fresh, uninitialized instance of the component registered under
    /// `node_type`.
    pub fn new_node(&self, node_type: &str) -> Result<Box<dyn Node + Send + Sync>> {
        let components = self.components.read().expect("registry lock poisoned");
        components
            .get(node_type)
            .map(|prototype| prototype.new_instance())
            .ok_or_else(|| RuleError::NotFound(node_type.to_string()))
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.components.read().expect("registry lock poisoned").contains_key(node_type)
    }

    /// Registered type keys, sorted.
    pub fn node_types(&self) -> Vec<String> {
        let mut keys: Vec<String> =
            self.components.read().expect("registry lock poisoned").keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("components", &self.node_types()).finish()
    }
}
