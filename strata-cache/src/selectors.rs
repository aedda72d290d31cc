//! Derived selectors over query state.
//!
//! Plain selectors are pure functions of a [`QueryState`] and fall back to a
//! shared empty snapshot when the entry has no entity data yet. [`MemoSelector`]
//! caches a derived value per input `Arc`, so an untouched entry never causes a
//! recomputation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use strata_core::{EntityId, Record};

use crate::entity_store::EntitySnapshot;
use crate::query::{QueryData, QueryState};

static EMPTY_SNAPSHOT: Lazy<EntitySnapshot> = Lazy::new(EntitySnapshot::new);

/// The entry's normalized collection, or an empty one.
pub fn select_snapshot(state: &QueryState) -> &EntitySnapshot {
    state
        .data
        .as_deref()
        .and_then(QueryData::as_entities)
        .unwrap_or(&*EMPTY_SNAPSHOT)
}

pub fn select_all_ids(state: &QueryState) -> &[EntityId] {
    select_snapshot(state).ids()
}

/// Records in stored order.
pub fn select_all_entities(state: &QueryState) -> Vec<&Record> {
    select_snapshot(state).iter().collect()
}

pub fn select_by_id<'a>(state: &'a QueryState, id: &EntityId) -> Option<&'a Record> {
    select_snapshot(state).get(id)
}

pub fn select_total(state: &QueryState) -> usize {
    select_snapshot(state).len()
}

struct Memo<P, R> {
    input: Arc<QueryState>,
    param: P,
    output: Arc<R>,
}

/// Memoized derived selector.
///
/// Recomputes only when handed a different state `Arc` (pointer identity) or a
/// different parameter. Use `P = ()` for unparameterized selectors.
pub struct MemoSelector<P, R> {
    compute: fn(&QueryState, &P) -> R,
    last: Mutex<Option<Memo<P, R>>>,
    recomputations: AtomicU64,
}

impl<P, R> MemoSelector<P, R>
where
    P: Clone + PartialEq,
{
    pub fn new(compute: fn(&QueryState, &P) -> R) -> Self {
        Self {
            compute,
            last: Mutex::new(None),
            recomputations: AtomicU64::new(0),
        }
    }

    pub fn select(&self, state: &Arc<QueryState>, param: &P) -> Arc<R> {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(memo) = last.as_ref() {
            if Arc::ptr_eq(&memo.input, state) && memo.param == *param {
                return Arc::clone(&memo.output);
            }
        }

        let output = Arc::new((self.compute)(state, param));
        self.recomputations.fetch_add(1, Ordering::Relaxed);
        *last = Some(Memo {
            input: Arc::clone(state),
            param: param.clone(),
            output: Arc::clone(&output),
        });
        output
    }

    /// How many times the compute function has run.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }

    /// Drop the memoized value.
    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
