//! Optimistic patch bookkeeping for a single query-cache entry.
//!
//! Each outstanding mutation that speculatively edited the entry owns one
//! record on the stack: the forward transform, the mutation argument, and the
//! data as it was right before the transform ran. Rolling back the newest
//! record is a plain `Arc` swap. Rolling back an older one restores its
//! snapshot and replays the records above it, so unrelated patches survive.

use std::sync::Arc;

use serde_json::Value;

use crate::query::QueryData;

/// Forward transform of an optimistic update. Receives the current data and the
/// mutation argument and returns the speculative data, or `None` when the patch
/// does not apply (for example the targeted entity is not cached).
pub type PatchFn = fn(&QueryData, &Value) -> Option<QueryData>;

/// Identifier of one optimistic patch, unique per client.
pub type PatchId = u64;

/// Lifecycle of one optimistic patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchState {
    Applied,
    Committed,
    RolledBack,
    /// A fresh fetch replaced the entry's data while the patch was outstanding.
    Superseded,
}

#[derive(Debug, Clone)]
struct PatchRecord {
    id: PatchId,
    forward: PatchFn,
    arg: Value,
    before: Arc<QueryData>,
    committed: bool,
}

/// Outstanding optimistic patches of one entry, oldest first.
#[derive(Debug, Clone, Default)]
pub struct PatchStack {
    records: Vec<PatchRecord>,
}

impl PatchStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: PatchId) -> bool {
        self.records.iter().any(|record| record.id == id)
    }

    /// Run `forward` over `current` and record the patch.
    ///
    /// Returns the speculative data, or `None` (and records nothing) when the
    /// transform does not apply.
    pub fn apply(
        &mut self,
        id: PatchId,
        forward: PatchFn,
        arg: &Value,
        current: &Arc<QueryData>,
    ) -> Option<Arc<QueryData>> {
        let next = Arc::new(forward(current, arg)?);
        self.records.push(PatchRecord {
            id,
            forward,
            arg: arg.clone(),
            before: Arc::clone(current),
            committed: false,
        });
        Some(next)
    }

    /// Confirm a patch. Its effect stays in the data.
    pub fn commit(&mut self, id: PatchId) -> PatchState {
        let Some(record) = self.records.iter_mut().find(|record| record.id == id) else {
            return PatchState::Superseded;
        };
        record.committed = true;
        self.collapse_committed();
        PatchState::Committed
    }

    /// Undo a patch.
    ///
    /// Returns the data the entry must now hold, or `None` when the patch is no
    /// longer tracked (already superseded by a fetch).
    pub fn rollback(&mut self, id: PatchId) -> Option<Arc<QueryData>> {
        let position = self.records.iter().position(|record| record.id == id)?;
        let removed = self.records.remove(position);

        let mut data = removed.before;
        for record in &mut self.records[position..] {
            record.before = Arc::clone(&data);
            if let Some(next) = (record.forward)(&data, &record.arg) {
                data = Arc::new(next);
            }
        }
        self.collapse_committed();
        Some(data)
    }

    /// Forget every outstanding patch. Their rollbacks become no-ops.
    pub fn supersede_all(&mut self) -> usize {
        let count = self.records.len();
        self.records.clear();
        count
    }

    // A committed patch at the bottom can never be replayed again.
    fn collapse_committed(&mut self) {
        let settled = self
            .records
            .iter()
            .take_while(|record| record.committed)
            .count();
        self.records.drain(..settled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Data is a JSON object; the patch arg is {"key": .., "value": ..}.
    fn set_key(data: &QueryData, arg: &Value) -> Option<QueryData> {
        let mut object = data.as_value()?.as_object()?.clone();
        let key = arg.get("key")?.as_str()?;
        object.insert(key.to_string(), arg.get("value")?.clone());
        Some(QueryData::Value(Value::Object(object)))
    }

    fn value_of(data: &Arc<QueryData>) -> Value {
        data.as_value().cloned().unwrap()
    }

    #[test]
    fn test_rollback_newest_restores_exact_arc() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!({"a": 1})));
        let patched = stack
            .apply(1, set_key, &json!({"key": "a", "value": 2}), &original)
            .unwrap();
        assert_eq!(value_of(&patched), json!({"a": 2}));

        let restored = stack.rollback(1).unwrap();
        assert!(Arc::ptr_eq(&restored, &original));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_rollback_older_keeps_newer_patch() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!({"a": 0, "b": 0})));
        let after_a = stack
            .apply(1, set_key, &json!({"key": "a", "value": 1}), &original)
            .unwrap();
        let after_b = stack
            .apply(2, set_key, &json!({"key": "b", "value": 1}), &after_a)
            .unwrap();
        assert_eq!(value_of(&after_b), json!({"a": 1, "b": 1}));

        let data = stack.rollback(1).unwrap();
        assert_eq!(value_of(&data), json!({"a": 0, "b": 1}));

        // B now undoes back to the original
        let data = stack.rollback(2).unwrap();
        assert!(Arc::ptr_eq(&data, &original));
    }

    #[test]
    fn test_commit_newer_then_rollback_older() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!({"a": 0, "b": 0})));
        let after_a = stack
            .apply(1, set_key, &json!({"key": "a", "value": 1}), &original)
            .unwrap();
        stack.apply(2, set_key, &json!({"key": "b", "value": 1}), &after_a);

        assert_eq!(stack.commit(2), PatchState::Committed);
        assert_eq!(stack.len(), 2);

        let data = stack.rollback(1).unwrap();
        assert_eq!(value_of(&data), json!({"a": 0, "b": 1}));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_commit_oldest_collapses() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!({"a": 0})));
        stack.apply(1, set_key, &json!({"key": "a", "value": 1}), &original);
        assert_eq!(stack.commit(1), PatchState::Committed);
        assert!(stack.is_empty());
        assert_eq!(stack.commit(1), PatchState::Superseded);
    }

    #[test]
    fn test_inapplicable_patch_is_not_recorded() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!([1, 2])));
        assert!(stack
            .apply(1, set_key, &json!({"key": "a", "value": 1}), &original)
            .is_none());
        assert!(!stack.contains(1));
    }

    #[test]
    fn test_supersede_all_makes_rollback_noop() {
        let mut stack = PatchStack::new();
        let original = Arc::new(QueryData::Value(json!({"a": 0})));
        stack.apply(1, set_key, &json!({"key": "a", "value": 1}), &original);
        assert_eq!(stack.supersede_all(), 1);
        assert!(stack.rollback(1).is_none());
    }
}
