// Property-based tests for the JSON transform chain

use common::transform::{Chain, JsonTransformer};
use proptest::collection::btree_map;
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
    ]
}

/// Non-empty flat object with identifier-like keys
fn flat_object() -> impl Strategy<Value = Map<String, Value>> {
    btree_map("[a-z]{1,8}", scalar(), 1..8).prop_map(|entries| entries.into_iter().collect())
}

/// Nested JSON documents up to three levels deep
fn document() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            btree_map("[a-z~]{1,6}", inner, 0..5)
                .prop_map(|entries| Value::Object(entries.into_iter().collect())),
        ]
    })
}

fn keys_sorted(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            let keys: Vec<&String> = map.keys().collect();
            let mut expected = keys.clone();
            expected.sort_by(|a, b| {
                (!a.starts_with('~'), a.as_str()).cmp(&(!b.starts_with('~'), b.as_str()))
            });
            keys == expected && map.values().all(keys_sorted)
        }
        Value::Array(items) => items.iter().all(keys_sorted),
        _ => true,
    }
}

proptest! {
    /// Sorting is idempotent and every object level ends up ordered
    #[test]
    fn property_sort_is_idempotent(doc in document()) {
        let chain = Chain::from_spec(&json!([{"operation": "sort"}])).unwrap();
        let once = chain.apply(doc);
        let twice = chain.apply(once.clone());

        prop_assert_eq!(
            serde_json::to_string(&once).unwrap(),
            serde_json::to_string(&twice).unwrap()
        );
        prop_assert!(keys_sorted(&once));
    }

    /// The same input and spec always produce the same output
    #[test]
    fn property_transform_is_repeatable(
        doc in document(),
        spec in prop_oneof![
            Just(r#"[{"operation":"shift","spec":{"*":"&","a":"moved.a[]"}}]"#),
            Just(r#"[{"operation":"default","spec":{"extra":1}},{"operation":"sort"}]"#),
            Just(r#"[{"operation":"remove","spec":{"a":""}},{"operation":"cardinality","spec":{"*":"MANY"}}]"#),
            Just(r#"[{"operation":"shift","spec":{"*":{"*":"&1.&0","@":"copy.&"}}},{"operation":"sort"}]"#),
        ],
    ) {
        let transformer = JsonTransformer::new();
        let input = doc.to_string();

        let first = transformer.transform(&input, spec);
        let second = transformer.transform(&input, spec);
        prop_assert_eq!(first, second);
    }

    /// A wildcard shift onto its own key reproduces a flat object
    #[test]
    fn property_wildcard_shift_is_identity(object in flat_object()) {
        let chain = Chain::from_spec(&json!([{"operation": "shift", "spec": {"*": "&"}}])).unwrap();
        let input = Value::Object(object);
        prop_assert_eq!(chain.apply(input.clone()), input);
    }

    /// Defaults fill only what is missing
    #[test]
    fn property_default_never_overwrites(object in flat_object(), fallback in scalar()) {
        let mut spec = Map::new();
        for key in object.keys() {
            spec.insert(key.clone(), fallback.clone());
        }
        spec.insert("addedByDefault".to_string(), fallback.clone());

        let chain = Chain::from_spec(&json!([{"operation": "default", "spec": spec}])).unwrap();
        let output = chain.apply(Value::Object(object.clone()));

        for (key, value) in &object {
            prop_assert_eq!(&output[key.as_str()], value);
        }
        prop_assert_eq!(&output["addedByDefault"], &fallback);
    }

    /// Remove drops exactly the named key
    #[test]
    fn property_remove_drops_only_named_key(object in flat_object()) {
        let target = object.keys().next().cloned().unwrap();
        let mut spec = Map::new();
        spec.insert(target.clone(), Value::from(""));
        let chain = Chain::from_spec(&json!([{"operation": "remove", "spec": spec}])).unwrap();
        let output = chain.apply(Value::Object(object.clone()));
        let output = output.as_object().unwrap();

        prop_assert!(!output.contains_key(&target));
        prop_assert_eq!(output.len(), object.len() - 1);
        for (key, value) in output {
            prop_assert_eq!(Some(value), object.get(key));
        }
    }

    /// Cardinality ONE keeps the first element of a non-empty array
    #[test]
    fn property_cardinality_one_takes_first(items in prop::collection::vec(scalar(), 1..6)) {
        let chain = Chain::from_spec(&json!([{"operation": "cardinality", "spec": {"list": "ONE"}}])).unwrap();
        let output = chain.apply(json!({"list": items.clone()}));
        prop_assert_eq!(&output["list"], &items[0]);
    }

    /// Inputs that are not JSON never panic and always report an error
    #[test]
    fn property_non_json_input_is_rejected(text in "[a-z ]{1,20}") {
        let transformer = JsonTransformer::new();
        let spec = r#"[{"operation":"shift","spec":{"*":"&"}}]"#;
        prop_assume!(serde_json::from_str::<Value>(&text).is_err());
        prop_assert!(transformer.transform(&text, spec).is_err());
    }
}

#[test]
fn test_rating_document_shift() {
    let input = r#"{"rating":{"primary":{"value":3},"quality":{"value":3}}}"#;
    let spec = r#"[{"operation":"shift","spec":{"rating":{"primary":{"value":"Rating"},"*":{"value":"SecondaryRatings.&1.Value"}}}}]"#;

    let output = JsonTransformer::new().transform(input, spec).unwrap();
    let output: Value = serde_json::from_str(&output).unwrap();
    assert_eq!(
        output,
        json!({"Rating": 3, "SecondaryRatings": {"quality": {"Value": 3}}})
    );
}
