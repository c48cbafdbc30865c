//! Shared traversal context.
//!
//! A [`ShareContext`] travels with a message through one traversal. Values
//! are copy-on-write: a node's `with_value` produces a new context visible
//! only to downstream nodes of the same branch, never to siblings that were
//! already scheduled. The cancellation flag is the exception — it is aliased
//! across every copy so that cancelling any handle cancels the whole
//! traversal.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Clone, Debug, Default)]
pub struct ShareContext {
    values: Arc<BTreeMap<String, Value>>,
    cancelled: Arc<AtomicBool>,
}

impl ShareContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// New context with `key` set. The cancellation flag stays aliased.
    pub fn with_value(&self, key: impl Into<String>, value: Value) -> Self {
        let mut values = (*self.values).clone();
        values.insert(key.into(), value);
        Self { values: Arc::new(values), cancelled: self.cancelled.clone() }
    }

    /// Cancel the traversal this context belongs to. The dispatcher stops
    /// scheduling new branches; in-flight handlers run to completion but
    /// their emissions are dropped.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
