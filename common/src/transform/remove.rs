// Remove: delete keys named by the spec

use super::pattern::KeyPattern;
use crate::errors::TransformError;
use serde_json::{Map, Value};

#[derive(Debug, Clone)]
enum RemoveNode {
    Remove,
    Nested(Vec<(KeyPattern, RemoveNode)>),
}

/// Compiled remove spec
#[derive(Debug, Clone)]
pub struct RemoveSpec {
    root: Vec<(KeyPattern, RemoveNode)>,
}

impl RemoveSpec {
    pub fn compile(spec: &Value) -> Result<Self, TransformError> {
        match spec {
            Value::Object(map) => Ok(Self {
                root: compile_level(map),
            }),
            _ => Err(TransformError::InvalidSpec {
                operation: "remove".to_string(),
                reason: "spec must be a JSON object".to_string(),
            }),
        }
    }

    pub fn apply(&self, mut input: Value) -> Value {
        remove_level(&self.root, &mut input);
        input
    }
}

fn compile_level(map: &Map<String, Value>) -> Vec<(KeyPattern, RemoveNode)> {
    map.iter()
        .map(|(key, value)| {
            let node = match value {
                Value::Object(nested) => RemoveNode::Nested(compile_level(nested)),
                _ => RemoveNode::Remove,
            };
            (KeyPattern::parse(key), node)
        })
        .collect()
}

fn remove_level(level: &[(KeyPattern, RemoveNode)], target: &mut Value) {
    let doomed = |key: &str| {
        level
            .iter()
            .any(|(pattern, node)| matches!(node, RemoveNode::Remove) && pattern.matches(key))
    };

    match target {
        Value::Object(map) => {
            map.retain(|key, _| !doomed(key.as_str()));
            for (key, value) in map.iter_mut() {
                recurse(level, key, value);
            }
        }
        Value::Array(items) => {
            let mut index = 0;
            items.retain(|_| {
                let keep = !doomed(index.to_string().as_str());
                index += 1;
                keep
            });
            for (index, item) in items.iter_mut().enumerate() {
                recurse(level, &index.to_string(), item);
            }
        }
        _ => {}
    }
}

fn recurse(level: &[(KeyPattern, RemoveNode)], key: &str, value: &mut Value) {
    for (pattern, node) in level {
        if let RemoveNode::Nested(nested) = node {
            if pattern.matches(key) {
                remove_level(nested, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn remove(spec: Value, input: Value) -> Value {
        RemoveSpec::compile(&spec).unwrap().apply(input)
    }

    #[test]
    fn test_removes_named_keys_and_keeps_order() {
        let output = remove(
            json!({"secret": "", "debug": ""}),
            json!({"a": 1, "secret": "x", "b": 2, "debug": true, "c": 3}),
        );
        assert_eq!(
            serde_json::to_string(&output).unwrap(),
            r#"{"a":1,"b":2,"c":3}"#
        );
    }

    #[test]
    fn test_nested_and_wildcard_removal() {
        let output = remove(
            json!({"users": {"*": {"password": ""}}}),
            json!({"users": {"u1": {"name": "a", "password": "p"}, "u2": {"password": "q"}}}),
        );
        assert_eq!(output, json!({"users": {"u1": {"name": "a"}, "u2": {}}}));
    }

    #[test]
    fn test_star_clears_level() {
        let output = remove(json!({"meta": {"*": ""}}), json!({"meta": {"a": 1, "b": 2}, "x": 1}));
        assert_eq!(output, json!({"meta": {}, "x": 1}));
    }

    #[test]
    fn test_array_elements_by_index() {
        let output = remove(json!({"list": {"1": ""}}), json!({"list": ["a", "b", "c"]}));
        assert_eq!(output, json!({"list": ["a", "c"]}));
    }

    #[test]
    fn test_missing_keys_are_ignored() {
        let output = remove(json!({"nope": "", "deep": {"er": ""}}), json!({"a": 1}));
        assert_eq!(output, json!({"a": 1}));
    }
}
