//! Normalized entity storage.
//!
//! An [`EntitySnapshot`] is an ordered id list plus an id-keyed record map.
//! Snapshots are values: every [`EntityAdapter`] operation returns a new one
//! and leaves its input untouched, which is what lets optimistic patches keep
//! the previous snapshot around for an exact undo.

use std::cmp::Ordering;
use std::collections::HashMap;

use strata_core::{EntityId, Record};

/// Ordering rule applied to `ids` after every write. Must be a total order;
/// ties keep insertion order because sorting is stable.
pub type SortComparer = fn(&Record, &Record) -> Ordering;

/// Normalized collection: `ids` holds exactly the keys of `entities`, no duplicates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySnapshot {
    ids: Vec<EntityId>,
    entities: HashMap<EntityId, Record>,
}

impl EntitySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids(&self) -> &[EntityId] {
        &self.ids
    }

    pub fn entities(&self) -> &HashMap<EntityId, Record> {
        &self.entities
    }

    pub fn get(&self, id: &EntityId) -> Option<&Record> {
        self.entities.get(id)
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.entities.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Records in `ids` order.
    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.ids.iter().filter_map(|id| self.entities.get(id))
    }

    fn sort(&mut self, comparer: SortComparer) {
        let entities = &self.entities;
        self.ids.sort_by(|a, b| match (entities.get(a), entities.get(b)) {
            (Some(left), Some(right)) => comparer(left, right),
            _ => Ordering::Equal,
        });
    }
}

/// Pure operations over [`EntitySnapshot`] with an optional ordering rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityAdapter {
    sort_comparer: Option<SortComparer>,
}

impl EntityAdapter {
    /// Adapter that keeps insertion order.
    pub const fn new() -> Self {
        Self {
            sort_comparer: None,
        }
    }

    /// Adapter that re-sorts `ids` with `comparer` after every write.
    pub const fn sorted(comparer: SortComparer) -> Self {
        Self {
            sort_comparer: Some(comparer),
        }
    }

    /// Replace the whole collection.
    ///
    /// A repeated id keeps the position of its first occurrence and the record
    /// of its last.
    pub fn set_all(&self, records: impl IntoIterator<Item = Record>) -> EntitySnapshot {
        let mut snapshot = EntitySnapshot::new();
        for record in records {
            if !snapshot.entities.contains_key(&record.id) {
                snapshot.ids.push(record.id.clone());
            }
            snapshot.entities.insert(record.id.clone(), record);
        }
        self.resort(&mut snapshot);
        snapshot
    }

    /// Merge `record` into the entity with the same id, or append it.
    pub fn upsert_one(&self, snapshot: &EntitySnapshot, record: Record) -> EntitySnapshot {
        let mut next = snapshot.clone();
        match next.entities.get_mut(&record.id) {
            Some(existing) => existing.merge(&record),
            None => {
                next.ids.push(record.id.clone());
                next.entities.insert(record.id.clone(), record);
            }
        }
        self.resort(&mut next);
        next
    }

    /// Apply `update` to one entity. Returns `None` when the id is absent.
    pub fn update_one(
        &self,
        snapshot: &EntitySnapshot,
        id: &EntityId,
        update: impl FnOnce(&mut Record),
    ) -> Option<EntitySnapshot> {
        let mut next = snapshot.clone();
        let record = next.entities.get_mut(id)?;
        update(record);
        // the id is the map key, a closure must not move the record elsewhere
        record.id = id.clone();
        self.resort(&mut next);
        Some(next)
    }

    /// Drop one entity. Unknown ids yield an identical copy.
    pub fn remove_one(&self, snapshot: &EntitySnapshot, id: &EntityId) -> EntitySnapshot {
        let mut next = snapshot.clone();
        if next.entities.remove(id).is_some() {
            next.ids.retain(|existing| existing != id);
        }
        next
    }

    fn resort(&self, snapshot: &mut EntitySnapshot) {
        if let Some(comparer) = self.sort_comparer {
            snapshot.sort(comparer);
        }
    }
}
