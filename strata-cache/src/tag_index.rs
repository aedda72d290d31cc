//! Tag → query-key index used for invalidation.
//!
//! The index only stores keys; entry data stays with the query cache.

use std::collections::{BTreeSet, HashMap};

use strata_core::{QueryKey, Tag};

/// Bidirectional mapping between tags and the cache entries providing them.
#[derive(Debug, Clone, Default)]
pub struct TagIndex {
    by_tag: HashMap<Tag, BTreeSet<QueryKey>>,
    by_key: HashMap<QueryKey, BTreeSet<Tag>>,
}

impl TagIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `key` from `old_tags` to `new_tags`.
    ///
    /// Tags present in both sets are left alone, so calling this twice with the
    /// same arguments changes nothing the second time.
    pub fn reconcile(&mut self, key: &QueryKey, old_tags: &BTreeSet<Tag>, new_tags: &BTreeSet<Tag>) {
        for tag in old_tags.difference(new_tags) {
            self.unlink(key, tag);
        }
        for tag in new_tags.difference(old_tags) {
            self.link(key, tag);
        }
    }

    /// Forget every tag registered for `key`.
    pub fn remove_key(&mut self, key: &QueryKey) {
        let Some(tags) = self.by_key.remove(key) else {
            return;
        };
        for tag in &tags {
            if let Some(keys) = self.by_tag.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
    }

    /// Union of the keys registered under any of `tags`.
    ///
    /// `{kind, LIST}` resolves to the keys that provide the list sentinel for
    /// that kind, whether or not they currently hold the written entity.
    pub fn resolve<'a>(&self, tags: impl IntoIterator<Item = &'a Tag>) -> BTreeSet<QueryKey> {
        let mut keys = BTreeSet::new();
        for tag in tags {
            if let Some(providers) = self.by_tag.get(tag) {
                keys.extend(providers.iter().cloned());
            }
        }
        keys
    }

    /// Tags currently registered for `key`.
    pub fn tags_for(&self, key: &QueryKey) -> BTreeSet<Tag> {
        self.by_key.get(key).cloned().unwrap_or_default()
    }

    /// Number of distinct tags with at least one provider.
    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    fn link(&mut self, key: &QueryKey, tag: &Tag) {
        self.by_tag.entry(tag.clone()).or_default().insert(key.clone());
        self.by_key.entry(key.clone()).or_default().insert(tag.clone());
    }

    fn unlink(&mut self, key: &QueryKey, tag: &Tag) {
        if let Some(keys) = self.by_tag.get_mut(tag) {
            keys.remove(key);
            if keys.is_empty() {
                self.by_tag.remove(tag);
            }
        }
        if let Some(tags) = self.by_key.get_mut(key) {
            tags.remove(tag);
            if tags.is_empty() {
                self.by_key.remove(key);
            }
        }
    }
}
