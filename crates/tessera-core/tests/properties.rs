//! Property-based tests for patch application.
//!
//! These check that applying a patch agrees with the plain collection
//! operation it describes, and that rejected patches leave the record as
//! they found it.

use proptest::prelude::*;
use serde_json::{json, Value};
use tessera_core::{apply_patch, ApplyOptions, NestedDelete, Patch, Path, PathKey, PatchError};

fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-z]{0,8}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn items_strategy() -> impl Strategy<Value = Vec<Value>> {
    prop::collection::vec(scalar_strategy(), 0..12)
}

fn list_record(items: &[Value]) -> Value {
    json!({"id": "shape:a", "xs": items})
}

fn xs_path(index: usize) -> Path {
    Path::new(vec![
        PathKey::from("shape:a"),
        PathKey::from("xs"),
        PathKey::Index(index),
    ])
}

proptest! {
    #[test]
    fn insert_matches_vec_splice(
        items in items_strategy(),
        values in prop::collection::vec(scalar_strategy(), 1..5),
        at in 0usize..16,
    ) {
        let index = at.min(items.len());
        let mut record = list_record(&items);
        apply_patch(&mut record, &Patch::insert(xs_path(index), values.clone()), &ApplyOptions::default()).unwrap();

        let mut expected = items.clone();
        expected.splice(index..index, values);
        prop_assert_eq!(&record["xs"], &Value::Array(expected));
    }

    #[test]
    fn insert_past_the_end_is_rejected_untouched(
        items in items_strategy(),
        past in 1usize..5,
    ) {
        let mut record = list_record(&items);
        let before = record.clone();
        let err = apply_patch(
            &mut record,
            &Patch::insert(xs_path(items.len() + past), vec![json!(1)]),
            &ApplyOptions::default(),
        )
        .unwrap_err();
        let is_out_of_range = matches!(err, PatchError::IndexOutOfRange { .. });
        prop_assert!(is_out_of_range);
        prop_assert_eq!(record, before);
    }

    #[test]
    fn nested_delete_matches_vec_drain(
        items in items_strategy().prop_filter("non-empty", |v| !v.is_empty()),
        start in 0usize..12,
        length in 1usize..4,
    ) {
        let start = start % items.len();
        let length = length.min(items.len() - start);
        let mut record = list_record(&items);
        let remove = ApplyOptions { nested_delete: NestedDelete::Remove };
        apply_patch(&mut record, &Patch::Del { path: xs_path(start), length }, &remove).unwrap();

        let mut expected = items.clone();
        expected.drain(start..start + length);
        prop_assert_eq!(&record["xs"], &Value::Array(expected));
    }

    #[test]
    fn offset_splice_never_mutates(
        text in "[a-z]{1,10}",
        offset in 1usize..10,
        inserted in "[a-z]{1,3}",
    ) {
        let mut record = json!({"id": "shape:a", "props": {"text": text}});
        let before = record.clone();
        let path = Path::parse("shape:a.props.text").child(offset);
        let err = apply_patch(&mut record, &Patch::splice(path, inserted), &ApplyOptions::default()).unwrap_err();
        prop_assert!(!err.is_fatal());
        prop_assert_eq!(record, before);
    }

    #[test]
    fn last_put_wins(values in prop::collection::vec(scalar_strategy(), 1..6)) {
        let mut record = json!({"id": "shape:a"});
        for value in &values {
            apply_patch(&mut record, &Patch::put(Path::parse("shape:a.props.w"), value.clone()), &ApplyOptions::default()).unwrap();
        }
        prop_assert_eq!(&record["props"]["w"], values.last().unwrap());
    }
}
