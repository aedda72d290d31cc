//! Property tests for the normalized store, the tag index and the patch stack.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::{json, Value};
use strata_cache::{EntityAdapter, PatchStack, QueryData, TagIndex};
use strata_core::{QueryKey, Record, Tag};
use strata_test_utils::{assertions, generators};

fn by_title(a: &Record, b: &Record) -> std::cmp::Ordering {
    let title = |r: &Record| r.get("title").and_then(Value::as_str).map(str::to_string);
    title(a).cmp(&title(b))
}

// Data is a JSON object; the argument names a key to bump.
fn bump(data: &QueryData, arg: &Value) -> Option<QueryData> {
    let mut object = data.as_value()?.as_object()?.clone();
    let key = arg.as_str()?;
    let next = object.get(key).and_then(Value::as_i64).unwrap_or(0) + 1;
    object.insert(key.to_string(), json!(next));
    Some(QueryData::Value(Value::Object(object)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_set_all_normalizes(records in generators::arb_records(30)) {
        let snapshot = EntityAdapter::new().set_all(records.clone());
        assertions::assert_snapshot_consistent(&snapshot);

        let unique: HashSet<_> = records.iter().map(|r| r.id.clone()).collect();
        prop_assert_eq!(snapshot.len(), unique.len());

        // the last record for an id wins
        for id in snapshot.ids() {
            let last = records.iter().rev().find(|r| &r.id == id);
            prop_assert_eq!(snapshot.get(id), last);
        }
    }

    #[test]
    fn prop_sorted_adapter_orders_ids(records in generators::arb_records(30)) {
        let snapshot = EntityAdapter::sorted(by_title).set_all(records);
        let ordered: Vec<&Record> = snapshot.iter().collect();
        for pair in ordered.windows(2) {
            prop_assert_ne!(by_title(pair[0], pair[1]), std::cmp::Ordering::Greater);
        }
    }

    #[test]
    fn prop_upsert_and_remove_stay_consistent(
        records in generators::arb_unique_records(20),
        extra in generators::arb_post_record_with(generators::arb_colliding_id()),
    ) {
        let adapter = EntityAdapter::new();
        let snapshot = adapter.set_all(records);
        let upserted = adapter.upsert_one(&snapshot, extra.clone());
        assertions::assert_snapshot_consistent(&upserted);
        prop_assert!(upserted.contains(&extra.id));

        let removed = adapter.remove_one(&upserted, &extra.id);
        assertions::assert_snapshot_consistent(&removed);
        prop_assert!(!removed.contains(&extra.id));
    }

    #[test]
    fn prop_reconcile_is_idempotent(
        key in generators::arb_query_key(),
        first in generators::arb_tags(8),
        second in generators::arb_tags(8),
    ) {
        let first: BTreeSet<Tag> = first.into_iter().collect();
        let second: BTreeSet<Tag> = second.into_iter().collect();

        let mut index = TagIndex::new();
        index.reconcile(&key, &BTreeSet::new(), &first);
        index.reconcile(&key, &first, &second);
        let once = index.clone();
        index.reconcile(&key, &second, &second);

        prop_assert_eq!(index.tags_for(&key), second.clone());
        prop_assert_eq!(index.tags_for(&key), once.tags_for(&key));
        for tag in &first {
            prop_assert_eq!(index.resolve([tag]).contains(&key), second.contains(tag));
        }
    }

    #[test]
    fn prop_index_resolves_back(entries in prop::collection::vec(
        (generators::arb_query_key(), generators::arb_tags(6)),
        0..10,
    )) {
        let mut index = TagIndex::new();
        let mut keys = Vec::new();
        for (key, tags) in entries {
            let old = index.tags_for(&key);
            let new: BTreeSet<Tag> = tags.into_iter().collect();
            index.reconcile(&key, &old, &new);
            keys.push(key);
        }
        assertions::assert_tag_index_consistent(&index, &keys);

        for key in &keys {
            index.remove_key(key);
        }
        prop_assert!(index.is_empty());
    }

    #[test]
    fn prop_rolling_back_every_patch_restores_original(
        (keys, order) in (1usize..6).prop_flat_map(|n| (
            prop::collection::vec("[a-c]", n),
            Just((0..n as u64).collect::<Vec<_>>()).prop_shuffle(),
        )),
    ) {
        let original = Arc::new(QueryData::Value(json!({})));
        let mut stack = PatchStack::new();
        let mut current = Arc::clone(&original);
        for (id, key) in keys.iter().enumerate() {
            current = stack
                .apply(id as u64, bump, &json!(key), &current)
                .expect("bump always applies");
        }
        prop_assert_eq!(stack.len(), keys.len());

        let mut last = None;
        for id in order {
            last = stack.rollback(id);
            prop_assert!(last.is_some());
        }
        prop_assert_eq!(last.as_deref(), Some(original.as_ref()));
        prop_assert!(stack.is_empty());
    }
}
