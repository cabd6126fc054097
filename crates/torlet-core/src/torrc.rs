//! Tor configuration maps: defaults, merging, and torrc rendering

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A tor configuration map: keyword to value.
///
/// Values are JSON so overrides can carry strings, numbers, booleans, or
/// arrays (an array renders as one torrc line per element).
pub type TorrcMap = BTreeMap<String, Value>;

/// Pool-wide default tor configuration.
///
/// Either a fixed map shared by every instance, or a generator invoked once
/// per created instance so each instance receives an independently-mutable
/// copy.
#[derive(Clone)]
pub enum DefaultTorrc {
    /// A static default map, deep-copied for each instance
    Static(TorrcMap),
    /// A zero-argument generator producing a fresh map per instance
    Generator(Arc<dyn Fn() -> TorrcMap + Send + Sync>),
}

impl DefaultTorrc {
    /// Produce the default map for one instance.
    pub fn resolve(&self) -> TorrcMap {
        match self {
            DefaultTorrc::Static(map) => map.clone(),
            DefaultTorrc::Generator(generator) => generator(),
        }
    }
}

impl Default for DefaultTorrc {
    fn default() -> Self {
        DefaultTorrc::Static(TorrcMap::new())
    }
}

impl fmt::Debug for DefaultTorrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultTorrc::Static(map) => f.debug_tuple("Static").field(map).finish(),
            DefaultTorrc::Generator(_) => f.debug_tuple("Generator").field(&"..").finish(),
        }
    }
}

/// Merge a default configuration with an instance override map.
///
/// The default is deep-copied first, then shallow-extended key-by-key with
/// the override map: on a top-level key conflict the override wins. The
/// inputs are never mutated.
pub fn merge_torrc(default: &TorrcMap, overrides: &TorrcMap) -> TorrcMap {
    let mut merged = default.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Render a configuration map to torrc file syntax.
///
/// Each entry becomes a `Keyword value` line; array values become one line
/// per element. Null values render the bare keyword.
pub fn render_torrc(map: &TorrcMap) -> String {
    let mut out = String::new();
    for (key, value) in map {
        match value {
            Value::Array(items) => {
                for item in items {
                    render_line(&mut out, key, item);
                }
            }
            other => render_line(&mut out, key, other),
        }
    }
    out
}

fn render_line(out: &mut String, key: &str, value: &Value) {
    match value {
        Value::Null => out.push_str(key),
        Value::String(s) => {
            out.push_str(key);
            out.push(' ');
            out.push_str(s);
        }
        Value::Bool(b) => {
            out.push_str(key);
            out.push(' ');
            out.push_str(if *b { "1" } else { "0" });
        }
        other => {
            out.push_str(key);
            out.push(' ');
            out.push_str(&other.to_string());
        }
    }
    out.push('\n');
}
