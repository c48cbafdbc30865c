//! `${...}` placeholder substitution.
//!
//! Two placeholder families exist, resolved at different times:
//!
//! - `${key}` — resolved against message metadata at dispatch time, every
//!   time a node executes;
//! - `${global.key}` — resolved against the engine's static properties once,
//!   while the node is initialized.
//!
//! Substitution is non-recursive and side-effect-free; unknown placeholders
//! are left verbatim.

use crate::message::Metadata;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Prefix marking placeholders resolved against engine properties.
pub const GLOBAL_PREFIX: &str = "global.";

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("invalid regex pattern"))
}

/// Whether `input` contains any `${...}` placeholder.
pub fn has_placeholders(input: &str) -> bool {
    placeholder_regex().is_match(input)
}

fn replace_each<F>(input: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    let regex = placeholder_regex();
    let mut result = String::with_capacity(input.len());
    let mut last_end = 0;

    for captures in regex.captures_iter(input) {
        let whole = captures.get(0).expect("capture 0 always present");
        let name = captures.get(1).expect("capture 1 always present").as_str().trim();

        result.push_str(&input[last_end..whole.start()]);
        match lookup(name) {
            Some(value) => result.push_str(&value),
            // Unknown placeholder stays verbatim.
            None => result.push_str(whole.as_str()),
        }
        last_end = whole.end();
    }

    result.push_str(&input[last_end..]);
    result
}

/// Resolve `${key}` placeholders against `metadata`. `${global.*}`
/// placeholders are not metadata's business and stay untouched unless the
/// metadata literally carries such a key.
pub fn render(input: &str, metadata: &Metadata) -> String {
    if !has_placeholders(input) {
        return input.to_string();
    }
    replace_each(input, |name| metadata.get(name).map(str::to_string))
}

/// Resolve `${global.key}` placeholders against engine properties. Plain
/// `${key}` placeholders stay untouched for dispatch-time resolution.
pub fn render_global(input: &str, properties: &BTreeMap<String, String>) -> String {
    if !has_placeholders(input) {
        return input.to_string();
    }
    replace_each(input, |name| {
        name.strip_prefix(GLOBAL_PREFIX).and_then(|key| properties.get(key).cloned())
    })
}

/// Resolve `${global.*}` placeholders in every string of a configuration
/// value, recursing through objects and arrays. Used once per node at init.
pub fn resolve_globals(value: &mut Value, properties: &BTreeMap<String, String>) {
    match value {
        Value::String(s) => {
            if has_placeholders(s) {
                *s = render_global(s, properties);
            }
        }
        Value::Array(items) => {
            for item in items {
                resolve_globals(item, properties);
            }
        }
        Value::Object(map) => {
            for item in map.values_mut() {
                resolve_globals(item, properties);
            }
        }
        _ => {}
    }
}
