use std::collections::BTreeMap;

use serde_json::Number;

use crate::tree::ConfigNode;

/// Keys whose values are hidden by [`redact_sensitive`].
const SENSITIVE_KEYS: [&str; 3] = ["password", "secret", "token"];

/// Return a normalized copy of a freshly constructed tree.
///
/// Normalization is an explicit step run right after a document is built:
/// floating point numbers with no fractional part become integers and map
/// keys are trimmed. When trimming makes two keys collide, the first key in
/// sorted order wins.
pub fn normalize(node: &ConfigNode) -> ConfigNode {
    match node {
        ConfigNode::Number(number) => ConfigNode::Number(normalize_number(number)),
        ConfigNode::List(items) => ConfigNode::List(items.iter().map(normalize).collect()),
        ConfigNode::Map(entries) => {
            let mut out = BTreeMap::new();
            for (key, value) in entries {
                out.entry(key.trim().to_string())
                    .or_insert_with(|| normalize(value));
            }
            ConfigNode::Map(out)
        }
        other => other.clone(),
    }
}

fn normalize_number(number: &Number) -> Number {
    if number.is_i64() || number.is_u64() {
        return number.clone();
    }
    match number.as_f64() {
        Some(value)
            if value.fract() == 0.0 && value >= i64::MIN as f64 && value <= i64::MAX as f64 =>
        {
            Number::from(value as i64)
        }
        _ => number.clone(),
    }
}

/// Return a copy of the tree with sensitive values replaced by `null`.
///
/// A value is sensitive when its key is `password`, `secret` or `token`,
/// compared case-insensitively, at any depth including maps nested in lists.
pub fn redact_sensitive(node: &ConfigNode) -> ConfigNode {
    match node {
        ConfigNode::Map(entries) => ConfigNode::Map(
            entries
                .iter()
                .map(|(key, value)| {
                    let lowered = key.to_ascii_lowercase();
                    if SENSITIVE_KEYS.contains(&lowered.as_str()) {
                        (key.clone(), ConfigNode::Null)
                    } else {
                        (key.clone(), redact_sensitive(value))
                    }
                })
                .collect(),
        ),
        ConfigNode::List(items) => ConfigNode::List(items.iter().map(redact_sensitive).collect()),
        other => other.clone(),
    }
}
