// Sort: order object keys alphabetically, recursively; `~` keys come first

use serde_json::{Map, Value};
use std::cmp::Ordering;

pub fn apply(input: Value) -> Value {
    match input {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| compare_keys(a, b));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, apply(value)))
                    .collect::<Map<String, Value>>(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(apply).collect()),
        other => other,
    }
}

fn compare_keys(a: &str, b: &str) -> Ordering {
    match (a.starts_with('~'), b.starts_with('~')) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.cmp(b),
    }
}
