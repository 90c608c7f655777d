// Shift: copy data from the input tree to new locations in the output tree
//
// Left-hand keys match the input (literal, `a|b`, `*` globs, `@`, `@(n,path)`,
// `$`, `#constant`); right-hand values name output paths built from `.`
// segments, `&` references to matched keys, `[]` appends and `[n]` indices.

use super::pattern::{order_wildcards, KeyPattern};
use crate::errors::TransformError;
use serde_json::{Map, Value};
use tracing::warn;

static NULL: Value = Value::Null;

/// Largest array index an output path may address; writes beyond it are dropped
const MAX_OUTPUT_INDEX: usize = 100_000;

fn invalid(reason: impl Into<String>) -> TransformError {
    TransformError::InvalidSpec {
        operation: "shift".to_string(),
        reason: reason.into(),
    }
}

/// Compiled shift spec
#[derive(Debug, Clone)]
pub struct ShiftSpec {
    root: ObjectSpec,
}

#[derive(Debug, Clone)]
enum Node {
    Object(Box<ObjectSpec>),
    Leaf(Vec<OutputPath>),
}

#[derive(Debug, Clone, Default)]
struct ObjectSpec {
    literals: Vec<(KeyPattern, Node)>,
    wildcards: Vec<(KeyPattern, Node)>,
    /// `@`: the current input value itself
    current: Vec<Node>,
    /// `@(n,path)`: a value looked up relative to an enclosing level
    lookups: Vec<(Lookup, Node)>,
    /// `$`, `$n`, `$(n,m)`: a matched key written as a value
    keys: Vec<(KeyRef, Vec<OutputPath>)>,
    /// `#text`: a constant written as a value
    constants: Vec<(String, Vec<OutputPath>)>,
}

/// Reference to capture `capture` of the key matched `level` levels up
#[derive(Debug, Clone, Copy, PartialEq)]
struct KeyRef {
    level: usize,
    capture: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct Lookup {
    level: usize,
    path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
struct OutputPath(Vec<Step>);

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Key(Vec<Part>),
    Index(IndexRef),
    Append,
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Text(String),
    Ref(KeyRef),
}

#[derive(Debug, Clone, PartialEq)]
enum IndexRef {
    Fixed(usize),
    Ref(KeyRef),
}

#[derive(Debug, Clone, PartialEq)]
enum Resolved {
    Key(String),
    Index(usize),
    Append,
}

/// One level of the walk: what matched and the input found there
struct Frame<'a> {
    captures: Vec<String>,
    input: &'a Value,
}

// ============================================================================
// Compilation
// ============================================================================

impl ShiftSpec {
    pub fn compile(spec: &Value) -> Result<Self, TransformError> {
        match spec {
            Value::Object(map) => Ok(Self {
                root: compile_object(map)?,
            }),
            _ => Err(invalid("spec must be a JSON object")),
        }
    }
}

fn compile_object(map: &Map<String, Value>) -> Result<ObjectSpec, TransformError> {
    let mut spec = ObjectSpec::default();

    for (key, value) in map {
        if key == "@" {
            spec.current.push(compile_node(key, value)?);
        } else if let Some(rest) = key.strip_prefix('@') {
            spec.lookups
                .push((parse_lookup(rest, key)?, compile_node(key, value)?));
        } else if let Some(rest) = key.strip_prefix('$') {
            let reference = parse_whole_ref(rest)
                .ok_or_else(|| invalid(format!("malformed key reference '{}'", key)))?;
            spec.keys.push((reference, compile_leaf(key, value)?));
        } else if let Some(constant) = key.strip_prefix('#') {
            spec.constants
                .push((constant.to_string(), compile_leaf(key, value)?));
        } else {
            let pattern = KeyPattern::parse(key);
            let node = compile_node(key, value)?;
            if pattern.is_literal() {
                spec.literals.push((pattern, node));
            } else {
                spec.wildcards.push((pattern, node));
            }
        }
    }

    order_wildcards(&mut spec.wildcards);
    Ok(spec)
}

fn compile_node(key: &str, value: &Value) -> Result<Node, TransformError> {
    match value {
        Value::Object(map) => Ok(Node::Object(Box::new(compile_object(map)?))),
        other => Ok(Node::Leaf(compile_outputs(key, other)?)),
    }
}

fn compile_leaf(key: &str, value: &Value) -> Result<Vec<OutputPath>, TransformError> {
    if value.is_object() {
        return Err(invalid(format!("'{}' must map to an output path", key)));
    }
    compile_outputs(key, value)
}

fn compile_outputs(key: &str, value: &Value) -> Result<Vec<OutputPath>, TransformError> {
    match value {
        // null output drops the match
        Value::Null => Ok(Vec::new()),
        Value::String(path) => Ok(vec![parse_output_path(path)?]),
        Value::Array(paths) => paths
            .iter()
            .map(|path| {
                path.as_str()
                    .ok_or_else(|| invalid(format!("outputs of '{}' must be strings", key)))
                    .and_then(parse_output_path)
            })
            .collect(),
        _ => Err(invalid(format!(
            "output of '{}' must be a string, an array of strings or an object",
            key
        ))),
    }
}

/// Parse a reference suffix (`""`, `"2"`, `"(1,2)"`) and report how much was consumed
fn take_ref(text: &str) -> Option<(KeyRef, usize)> {
    if let Some(inner) = text.strip_prefix('(') {
        let close = inner.find(')')?;
        let mut numbers = inner[..close].split(',').map(|n| n.trim().parse::<usize>());
        let level = numbers.next()?.ok()?;
        let capture = match numbers.next() {
            Some(n) => n.ok()?,
            None => 0,
        };
        if numbers.next().is_some() {
            return None;
        }
        return Some((KeyRef { level, capture }, close + 2));
    }

    let digits = text.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return Some((KeyRef { level: 0, capture: 0 }, 0));
    }
    let level = text[..digits].parse().ok()?;
    Some((KeyRef { level, capture: 0 }, digits))
}

fn parse_whole_ref(text: &str) -> Option<KeyRef> {
    match take_ref(text)? {
        (reference, consumed) if consumed == text.len() => Some(reference),
        _ => None,
    }
}

fn parse_lookup(rest: &str, key: &str) -> Result<Lookup, TransformError> {
    let malformed = || invalid(format!("malformed lookup '{}'", key));

    let (level, path) = match rest.strip_prefix('(') {
        Some(inner) => {
            let inner = inner.strip_suffix(')').ok_or_else(malformed)?;
            match inner.split_once(',') {
                Some((level, path)) => (level.trim(), path.trim()),
                None => (inner.trim(), ""),
            }
        }
        None => ("0", rest),
    };

    let level = level.parse::<usize>().map_err(|_| malformed())?;
    let path = path
        .split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect();

    Ok(Lookup { level, path })
}

fn parse_output_path(path: &str) -> Result<OutputPath, TransformError> {
    let mut steps = Vec::new();
    if path.is_empty() {
        return Ok(OutputPath(steps));
    }
    for segment in path.split('.') {
        parse_segment(segment, path, &mut steps)?;
    }
    Ok(OutputPath(steps))
}

fn parse_segment(segment: &str, path: &str, steps: &mut Vec<Step>) -> Result<(), TransformError> {
    let (key, mut brackets) = match segment.find('[') {
        Some(pos) => (&segment[..pos], &segment[pos..]),
        None => (segment, ""),
    };

    if !key.is_empty() || brackets.is_empty() {
        steps.push(Step::Key(parse_template(key, path)?));
    }

    while !brackets.is_empty() {
        if !brackets.starts_with('[') {
            return Err(invalid(format!("unexpected text after ']' in '{}'", path)));
        }
        let close = brackets
            .find(']')
            .ok_or_else(|| invalid(format!("unclosed '[' in '{}'", path)))?;
        let inner = &brackets[1..close];

        let step = if inner.is_empty() {
            Step::Append
        } else if let Some(rest) = inner.strip_prefix('&') {
            let reference = parse_whole_ref(rest)
                .ok_or_else(|| invalid(format!("malformed index reference in '{}'", path)))?;
            Step::Index(IndexRef::Ref(reference))
        } else {
            let index = inner
                .parse::<usize>()
                .map_err(|_| invalid(format!("index '{}' in '{}' is not a number", inner, path)))?;
            Step::Index(IndexRef::Fixed(index))
        };
        steps.push(step);
        brackets = &brackets[close + 1..];
    }

    Ok(())
}

fn parse_template(key: &str, path: &str) -> Result<Vec<Part>, TransformError> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut rest = key;

    while let Some(pos) = rest.find('&') {
        text.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let (reference, consumed) = take_ref(after)
            .ok_or_else(|| invalid(format!("malformed reference in '{}'", path)))?;
        if !text.is_empty() {
            parts.push(Part::Text(std::mem::take(&mut text)));
        }
        parts.push(Part::Ref(reference));
        rest = &after[consumed..];
    }

    text.push_str(rest);
    if !text.is_empty() || parts.is_empty() {
        parts.push(Part::Text(text));
    }
    Ok(parts)
}

// ============================================================================
// Application
// ============================================================================

impl ShiftSpec {
    /// Apply to an input value; returns `Null` when nothing matched
    pub fn apply(&self, input: &Value) -> Value {
        let mut output = Value::Null;
        let mut frames = vec![Frame {
            captures: vec![String::new()],
            input,
        }];
        walk(&self.root, input, &mut frames, &mut output);
        output
    }
}

fn walk<'a>(spec: &ObjectSpec, input: &'a Value, frames: &mut Vec<Frame<'a>>, output: &mut Value) {
    for (key, child) in entries(input) {
        let mut matched_literal = false;
        for (pattern, node) in &spec.literals {
            if pattern.matches(&key) {
                matched_literal = true;
                descend(node, vec![key.clone()], child, frames, output);
            }
        }
        if matched_literal {
            continue;
        }

        let wildcard = spec
            .wildcards
            .iter()
            .find_map(|(pattern, node)| pattern.captures(&key).map(|captures| (captures, node)));
        if let Some((captures, node)) = wildcard {
            descend(node, captures, child, frames, output);
        }
    }

    for node in &spec.current {
        let captures = top_captures(frames);
        descend(node, captures, input, frames, output);
    }

    for (lookup, node) in &spec.lookups {
        if let Some(found) = resolve_lookup(lookup, frames) {
            let captures = top_captures(frames);
            descend(node, captures, found, frames, output);
        }
    }

    for (reference, paths) in &spec.keys {
        let key = resolve_ref(frames, *reference);
        frames.push(Frame {
            captures: vec![key.clone()],
            input: &NULL,
        });
        write_all(paths, &Value::String(key), frames, output);
        frames.pop();
    }

    for (constant, paths) in &spec.constants {
        frames.push(Frame {
            captures: vec![constant.clone()],
            input: &NULL,
        });
        write_all(paths, &Value::String(constant.clone()), frames, output);
        frames.pop();
    }
}

/// Keys a spec level can match: object keys, array indices, or a scalar's own text
fn entries(input: &Value) -> Vec<(String, &Value)> {
    match input {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v)).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        Value::String(text) => vec![(text.clone(), input)],
        Value::Number(n) => vec![(n.to_string(), input)],
        Value::Bool(b) => vec![(b.to_string(), input)],
        Value::Null => Vec::new(),
    }
}

fn descend<'a>(
    node: &Node,
    captures: Vec<String>,
    input: &'a Value,
    frames: &mut Vec<Frame<'a>>,
    output: &mut Value,
) {
    frames.push(Frame { captures, input });
    match node {
        Node::Object(spec) => walk(spec, input, frames, output),
        Node::Leaf(paths) => write_all(paths, input, frames, output),
    }
    frames.pop();
}

fn top_captures(frames: &[Frame<'_>]) -> Vec<String> {
    frames
        .last()
        .map(|frame| frame.captures.clone())
        .unwrap_or_default()
}

fn frame_at<'f, 'a>(frames: &'f [Frame<'a>], level: usize) -> Option<&'f Frame<'a>> {
    frames
        .len()
        .checked_sub(level + 1)
        .and_then(|index| frames.get(index))
}

fn resolve_ref(frames: &[Frame<'_>], reference: KeyRef) -> String {
    frame_at(frames, reference.level)
        .and_then(|frame| frame.captures.get(reference.capture))
        .cloned()
        .unwrap_or_default()
}

fn resolve_lookup<'a>(lookup: &Lookup, frames: &[Frame<'a>]) -> Option<&'a Value> {
    let mut current: &'a Value = frame_at(frames, lookup.level)?.input;
    for segment in &lookup.path {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn write_all(paths: &[OutputPath], value: &Value, frames: &[Frame<'_>], output: &mut Value) {
    for path in paths {
        match resolve_path(path, frames) {
            Some(steps) => put(output, &steps, value.clone()),
            None => warn!(
                max = MAX_OUTPUT_INDEX,
                "Shift output index is not a number or exceeds the limit; skipping write"
            ),
        }
    }
}

fn resolve_path(path: &OutputPath, frames: &[Frame<'_>]) -> Option<Vec<Resolved>> {
    path.0
        .iter()
        .map(|step| match step {
            Step::Key(parts) => Some(Resolved::Key(
                parts
                    .iter()
                    .map(|part| match part {
                        Part::Text(text) => text.clone(),
                        Part::Ref(reference) => resolve_ref(frames, *reference),
                    })
                    .collect(),
            )),
            Step::Index(IndexRef::Fixed(index)) => bounded_index(*index),
            Step::Index(IndexRef::Ref(reference)) => resolve_ref(frames, *reference)
                .parse()
                .ok()
                .and_then(bounded_index),
            Step::Append => Some(Resolved::Append),
        })
        .collect()
}

fn bounded_index(index: usize) -> Option<Resolved> {
    (index <= MAX_OUTPUT_INDEX).then_some(Resolved::Index(index))
}

fn put(target: &mut Value, steps: &[Resolved], value: Value) {
    let Some((step, rest)) = steps.split_first() else {
        merge(target, value);
        return;
    };

    match step {
        Resolved::Key(key) => {
            if target.is_null() {
                *target = Value::Object(Map::new());
            }
            match target {
                Value::Object(map) => {
                    let slot = map.entry(key.clone()).or_insert(Value::Null);
                    put(slot, rest, value);
                }
                _ => warn!(key = %key, "Shift output path runs through a non-object; dropping write"),
            }
        }
        Resolved::Index(index) => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            match target {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(index + 1, Value::Null);
                    }
                    put(&mut items[*index], rest, value);
                }
                _ => warn!(index = *index, "Shift output index applied to a non-array; dropping write"),
            }
        }
        Resolved::Append => {
            if target.is_null() {
                *target = Value::Array(Vec::new());
            }
            match target {
                Value::Array(items) => {
                    items.push(Value::Null);
                    if let Some(last) = items.last_mut() {
                        put(last, rest, value);
                    }
                }
                _ => warn!("Shift append applied to a non-array; dropping write"),
            }
        }
    }
}

/// Writing to an occupied location turns it into an array of every value written
fn merge(target: &mut Value, value: Value) {
    match target {
        Value::Null => *target = value,
        Value::Array(items) => items.push(value),
        existing => {
            let previous = existing.take();
            *existing = Value::Array(vec![previous, value]);
        }
    }
}
