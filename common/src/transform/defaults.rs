// Default: fill in keys that are missing or null, never overwriting data

use super::pattern::{order_wildcards, KeyPattern};
use crate::errors::TransformError;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
enum DefaultNode {
    Value(Value),
    Object(DefaultLevel),
}

#[derive(Debug, Clone, Default)]
struct DefaultLevel {
    literals: Vec<(KeyPattern, DefaultNode)>,
    wildcards: Vec<(KeyPattern, DefaultNode)>,
}

/// Compiled default spec
#[derive(Debug, Clone)]
pub struct DefaultSpec {
    root: DefaultLevel,
}

impl DefaultSpec {
    pub fn compile(spec: &Value) -> Result<Self, TransformError> {
        match spec {
            Value::Object(map) => Ok(Self {
                root: compile_level(map),
            }),
            _ => Err(TransformError::InvalidSpec {
                operation: "default".to_string(),
                reason: "spec must be a JSON object".to_string(),
            }),
        }
    }

    /// A null input is treated as an empty object
    pub fn apply(&self, input: Value) -> Value {
        let mut output = match input {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        apply_level(&self.root, &mut output);
        output
    }
}

fn compile_level(map: &Map<String, Value>) -> DefaultLevel {
    let mut level = DefaultLevel::default();
    for (key, value) in map {
        let pattern = KeyPattern::parse(key);
        let node = match value {
            Value::Object(nested) => DefaultNode::Object(compile_level(nested)),
            other => DefaultNode::Value(other.clone()),
        };
        if pattern.is_literal() {
            level.literals.push((pattern, node));
        } else {
            level.wildcards.push((pattern, node));
        }
    }
    order_wildcards(&mut level.wildcards);
    level
}

fn apply_level(level: &DefaultLevel, target: &mut Value) {
    match target {
        Value::Object(map) => {
            for (pattern, node) in &level.literals {
                for key in pattern.literals() {
                    apply_literal(map, key, node);
                }
            }
            for (pattern, node) in &level.wildcards {
                for (key, value) in map.iter_mut() {
                    if pattern.matches(key) {
                        apply_existing(node, value);
                    }
                }
            }
        }
        Value::Array(items) => {
            // arrays only take defaults into elements that already exist
            for (index, item) in items.iter_mut().enumerate() {
                let key = index.to_string();
                let node = level
                    .literals
                    .iter()
                    .chain(level.wildcards.iter())
                    .find(|(pattern, _)| pattern.matches(&key))
                    .map(|(_, node)| node);
                if let Some(node) = node {
                    apply_existing(node, item);
                }
            }
        }
        _ => {}
    }
}

fn apply_literal(map: &mut Map<String, Value>, key: &str, node: &DefaultNode) {
    match node {
        DefaultNode::Value(default) => {
            let slot = map.entry(key.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = default.clone();
            }
        }
        DefaultNode::Object(nested) => {
            let slot = map.entry(key.to_string()).or_insert(Value::Null);
            if slot.is_null() {
                *slot = Value::Object(Map::new());
            }
            apply_level(nested, slot);
        }
    }
}

fn apply_existing(node: &DefaultNode, value: &mut Value) {
    match node {
        DefaultNode::Value(default) => {
            if value.is_null() {
                *value = default.clone();
            }
        }
        DefaultNode::Object(nested) => {
            if value.is_null() {
                *value = Value::Object(Map::new());
            }
            apply_level(nested, value);
        }
    }
}
