// Cardinality: force values to a single element (ONE) or to an array (MANY)

use super::pattern::{order_wildcards, KeyPattern};
use crate::errors::TransformError;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rule {
    One,
    Many,
}

#[derive(Debug, Clone)]
enum CardinalityNode {
    Rule(Rule),
    Nested(CardinalityLevel),
}

#[derive(Debug, Clone, Default)]
struct CardinalityLevel {
    /// `@` rule applied to the level's own value before its children
    own: Option<Rule>,
    literals: Vec<(KeyPattern, CardinalityNode)>,
    wildcards: Vec<(KeyPattern, CardinalityNode)>,
}

/// Compiled cardinality spec
#[derive(Debug, Clone)]
pub struct CardinalitySpec {
    root: CardinalityLevel,
}

fn invalid(reason: String) -> TransformError {
    TransformError::InvalidSpec {
        operation: "cardinality".to_string(),
        reason,
    }
}

impl CardinalitySpec {
    pub fn compile(spec: &Value) -> Result<Self, TransformError> {
        match spec {
            Value::Object(map) => Ok(Self {
                root: compile_level(map)?,
            }),
            _ => Err(invalid("spec must be a JSON object".to_string())),
        }
    }

    pub fn apply(&self, mut input: Value) -> Value {
        apply_level(&self.root, &mut input);
        input
    }
}

fn parse_rule(key: &str, value: &Value) -> Result<Rule, TransformError> {
    match value.as_str().map(str::to_ascii_uppercase).as_deref() {
        Some("ONE") => Ok(Rule::One),
        Some("MANY") => Ok(Rule::Many),
        _ => Err(invalid(format!(
            "'{}' must be \"ONE\", \"MANY\" or an object, got {}",
            key, value
        ))),
    }
}

fn compile_level(map: &Map<String, Value>) -> Result<CardinalityLevel, TransformError> {
    let mut level = CardinalityLevel::default();
    for (key, value) in map {
        if key == "@" {
            level.own = Some(parse_rule(key, value)?);
            continue;
        }
        let node = match value {
            Value::Object(nested) => CardinalityNode::Nested(compile_level(nested)?),
            other => CardinalityNode::Rule(parse_rule(key, other)?),
        };
        let pattern = KeyPattern::parse(key);
        if pattern.is_literal() {
            level.literals.push((pattern, node));
        } else {
            level.wildcards.push((pattern, node));
        }
    }
    order_wildcards(&mut level.wildcards);
    Ok(level)
}

fn apply_rule(rule: Rule, value: &mut Value) {
    match (rule, value.take()) {
        (Rule::One, Value::Array(items)) => {
            *value = items.into_iter().next().unwrap_or(Value::Null);
        }
        (Rule::Many, Value::Array(items)) => *value = Value::Array(items),
        (Rule::Many, other) => *value = Value::Array(vec![other]),
        (Rule::One, other) => *value = other,
    }
}

fn apply_level(level: &CardinalityLevel, target: &mut Value) {
    if let Some(rule) = level.own {
        apply_rule(rule, target);
    }

    match target {
        Value::Object(map) => {
            for (key, value) in map.iter_mut() {
                if let Some(node) = select(level, key) {
                    apply_node(node, value);
                }
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter_mut().enumerate() {
                if let Some(node) = select(level, &index.to_string()) {
                    apply_node(node, item);
                }
            }
        }
        _ => {}
    }
}

fn select<'s>(level: &'s CardinalityLevel, key: &str) -> Option<&'s CardinalityNode> {
    level
        .literals
        .iter()
        .find(|(pattern, _)| pattern.matches(key))
        .or_else(|| level.wildcards.iter().find(|(pattern, _)| pattern.matches(key)))
        .map(|(_, node)| node)
}

fn apply_node(node: &CardinalityNode, value: &mut Value) {
    match node {
        CardinalityNode::Rule(rule) => apply_rule(*rule, value),
        CardinalityNode::Nested(nested) => apply_level(nested, value),
    }
}
