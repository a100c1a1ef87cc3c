//! Bulk selection model

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::item::{ItemId, ItemKey};
use super::share::ShareId;

/// A set of items targeted by one batched mutation, grouped by share
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSelection {
    items: BTreeMap<ShareId, BTreeSet<ItemId>>,
}

impl BulkSelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: ItemKey) -> bool {
        self.items.entry(key.share_id).or_default().insert(key.item_id)
    }

    #[must_use]
    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items
            .get(&key.share_id)
            .is_some_and(|items| items.contains(&key.item_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.values().map(BTreeSet::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.values().all(BTreeSet::is_empty)
    }

    pub fn share_ids(&self) -> impl Iterator<Item = &ShareId> {
        self.items.keys()
    }

    /// Items of a single share, in stable order
    pub fn items_in(&self, share_id: &ShareId) -> impl Iterator<Item = &ItemId> {
        self.items.get(share_id).into_iter().flatten()
    }

    pub fn keys(&self) -> impl Iterator<Item = ItemKey> + '_ {
        self.items.iter().flat_map(|(share_id, items)| {
            items
                .iter()
                .map(move |item_id| ItemKey::new(share_id.clone(), item_id.clone()))
        })
    }
}

impl FromIterator<ItemKey> for BulkSelection {
    fn from_iter<T: IntoIterator<Item = ItemKey>>(iter: T) -> Self {
        let mut selection = Self::new();
        for key in iter {
            selection.insert(key);
        }
        selection
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn groups_items_by_share_and_dedupes() {
        let selection: BulkSelection = [
            ItemKey::new("s2", "b"),
            ItemKey::new("s1", "a"),
            ItemKey::new("s2", "b"),
            ItemKey::new("s2", "c"),
        ]
        .into_iter()
        .collect();

        assert_eq!(selection.len(), 3);
        assert_eq!(
            selection.share_ids().map(ShareId::as_str).collect::<Vec<_>>(),
            vec!["s1", "s2"]
        );
        assert!(selection.contains(&ItemKey::new("s2", "c")));
        assert!(!selection.contains(&ItemKey::new("s1", "c")));
    }

    #[test]
    fn empty_selection() {
        assert!(BulkSelection::new().is_empty());
        assert_eq!(BulkSelection::new().keys().count(), 0);
    }
}
