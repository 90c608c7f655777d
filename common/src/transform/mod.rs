// Declarative JSON transform engine
// A spec is an ordered array of {"operation": kind, "spec": params} objects,
// compatible with the Jolt chain format.

pub mod cardinality;
pub mod defaults;
mod pattern;
pub mod remove;
pub mod shift;
pub mod sort;

use crate::errors::TransformError;
use serde_json::Value;
use tracing::{debug, instrument};

pub use cardinality::CardinalitySpec;
pub use defaults::DefaultSpec;
pub use remove::RemoveSpec;
pub use shift::ShiftSpec;

/// One compiled step of a chain
#[derive(Debug, Clone)]
pub enum Operation {
    Shift(ShiftSpec),
    Default(DefaultSpec),
    Remove(RemoveSpec),
    Sort,
    Cardinality(CardinalitySpec),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Shift(_) => "shift",
            Operation::Default(_) => "default",
            Operation::Remove(_) => "remove",
            Operation::Sort => "sort",
            Operation::Cardinality(_) => "cardinality",
        }
    }

    fn compile(index: usize, entry: &Value) -> Result<Self, TransformError> {
        let object = entry.as_object().ok_or_else(|| {
            TransformError::SpecParse(format!("entry {} is not a JSON object", index))
        })?;

        let kind = object
            .get("operation")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                TransformError::SpecParse(format!(
                    "entry {} has no string 'operation' field",
                    index
                ))
            })?;

        let params = object.get("spec");
        let required = |name: &str| {
            params.ok_or_else(|| TransformError::InvalidSpec {
                operation: name.to_string(),
                reason: format!("entry {} has no 'spec' field", index),
            })
        };

        match kind {
            "shift" => Ok(Operation::Shift(ShiftSpec::compile(required("shift")?)?)),
            "default" => Ok(Operation::Default(DefaultSpec::compile(required(
                "default",
            )?)?)),
            "remove" => Ok(Operation::Remove(RemoveSpec::compile(required("remove")?)?)),
            "sort" => Ok(Operation::Sort),
            "cardinality" => Ok(Operation::Cardinality(CardinalitySpec::compile(
                required("cardinality")?,
            )?)),
            other => Err(TransformError::SpecParse(format!(
                "entry {} names unknown operation '{}'",
                index, other
            ))),
        }
    }

    pub fn apply(&self, input: Value) -> Value {
        match self {
            Operation::Shift(spec) => spec.apply(&input),
            Operation::Default(spec) => spec.apply(input),
            Operation::Remove(spec) => spec.apply(input),
            Operation::Sort => sort::apply(input),
            Operation::Cardinality(spec) => spec.apply(input),
        }
    }
}

/// A compiled operation chain; compiling validates every entry up front
#[derive(Debug, Clone, Default)]
pub struct Chain {
    operations: Vec<Operation>,
}

impl Chain {
    /// Parse and compile a chain from its JSON text
    pub fn from_spec_str(spec: &str) -> Result<Self, TransformError> {
        let value: Value = serde_json::from_str(spec)
            .map_err(|e| TransformError::SpecParse(format!("spec is not valid JSON: {}", e)))?;
        Self::from_spec(&value)
    }

    pub fn from_spec(spec: &Value) -> Result<Self, TransformError> {
        let entries = spec.as_array().ok_or_else(|| {
            TransformError::SpecParse("spec must be a JSON array of operations".to_string())
        })?;

        let operations = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Operation::compile(index, entry))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { operations })
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Apply each operation in order, feeding each output into the next
    pub fn apply(&self, input: Value) -> Value {
        self.operations.iter().fold(input, |value, operation| {
            debug!(operation = operation.name(), "Applying transform operation");
            operation.apply(value)
        })
    }

    /// Transform JSON text; an empty result renders as `null`
    pub fn transform_str(&self, input_json: &str) -> Result<String, TransformError> {
        let input: Value = serde_json::from_str(input_json)?;
        let output = self.apply(input);
        Ok(serde_json::to_string(&output)?)
    }
}

/// Stateless entry point pairing input text with spec text
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTransformer;

impl JsonTransformer {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip_all, fields(input_len = input_json.len(), spec_len = spec_json.len()))]
    pub fn transform(&self, input_json: &str, spec_json: &str) -> Result<String, TransformError> {
        let chain = Chain::from_spec_str(spec_json)?;
        chain.transform_str(input_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const RATING_SPEC: &str = r#"[{"operation":"shift","spec":{"rating":"Rating"}}]"#;

    #[test]
    fn test_shift_renames_key_and_drops_the_rest() {
        let output = JsonTransformer::new()
            .transform(r#"{"rating":5,"product":"Book"}"#, RATING_SPEC)
            .unwrap();
        assert_eq!(output, r#"{"Rating":5}"#);
    }

    #[test]
    fn test_shift_of_empty_object_is_null() {
        let output = JsonTransformer::new().transform("{}", RATING_SPEC).unwrap();
        assert_eq!(output, "null");
    }

    #[test]
    fn test_malformed_spec_is_spec_parse_error() {
        let err = JsonTransformer::new()
            .transform(r#"{"rating":5}"#, "invalid json")
            .unwrap_err();
        assert!(matches!(err, TransformError::SpecParse(_)));
    }

    #[test]
    fn test_spec_must_be_an_array() {
        let err = Chain::from_spec_str(r#"{"operation":"shift"}"#).unwrap_err();
        assert!(matches!(err, TransformError::SpecParse(_)));
    }

    #[test]
    fn test_unknown_operation_rejected() {
        let err = Chain::from_spec_str(r#"[{"operation":"modify-overwrite-beta","spec":{}}]"#)
            .unwrap_err();
        assert!(matches!(err, TransformError::SpecParse(_)));
    }

    #[test]
    fn test_chain_compiles_before_applying() {
        // the second entry is broken, so nothing from the first may leak out
        let spec = r#"[
            {"operation":"shift","spec":{"a":"b"}},
            {"operation":"cardinality","spec":{"b":"SEVERAL"}}
        ]"#;
        let err = JsonTransformer::new().transform(r#"{"a":1}"#, spec).unwrap_err();
        assert!(matches!(err, TransformError::InvalidSpec { .. }));
    }

    #[test]
    fn test_invalid_input_reported() {
        let err = JsonTransformer::new().transform("{oops", RATING_SPEC).unwrap_err();
        assert!(matches!(err, TransformError::InvalidInput(_)));
    }

    #[test]
    fn test_empty_chain_is_identity() {
        let chain = Chain::from_spec_str("[]").unwrap();
        assert!(chain.is_empty());
        assert_eq!(chain.apply(json!({"x": [1, 2]})), json!({"x": [1, 2]}));
    }

    #[test]
    fn test_operations_feed_each_other() {
        let spec = r#"[
            {"operation":"shift","spec":{"rating":"review.score","product":"review.title"}},
            {"operation":"default","spec":{"review":{"source":"import"}}},
            {"operation":"remove","spec":{"review":{"title":""}}},
            {"operation":"cardinality","spec":{"review":{"score":"MANY"}}},
            {"operation":"sort"}
        ]"#;
        let output = JsonTransformer::new()
            .transform(r#"{"rating":4,"product":"Lamp"}"#, spec)
            .unwrap();
        assert_eq!(output, r#"{"review":{"score":[4],"source":"import"}}"#);
    }

    #[test]
    fn test_missing_params_for_shift_is_invalid_spec() {
        let err = Chain::from_spec_str(r#"[{"operation":"shift"}]"#).unwrap_err();
        assert!(matches!(err, TransformError::InvalidSpec { .. }));
    }
}
