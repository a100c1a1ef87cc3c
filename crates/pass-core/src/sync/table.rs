//! Server-confirmed item state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{ItemKey, ItemRevision, Revision, RevisionUpdate, ShareId};

/// Result of offering a revision to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// The table already holds this revision or a newer one
    Ignored { local: Revision },
    /// A revision bump arrived for an item the table does not hold
    Missing,
}

impl Upsert {
    pub const fn changed(self) -> bool {
        matches!(self, Self::Inserted | Self::Updated)
    }
}

/// Every confirmed item, keyed by share and item id.
///
/// Writes go through [`ItemTable::upsert`], which only accepts strictly newer
/// revisions. Deletes are unconditional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<ItemRevision>", into = "Vec<ItemRevision>")]
pub struct ItemTable {
    items: BTreeMap<ItemKey, ItemRevision>,
}

impl ItemTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ItemKey) -> Option<&ItemRevision> {
        self.items.get(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemRevision> {
        self.items.values()
    }

    pub fn items_in_share<'a>(
        &'a self,
        share_id: &'a ShareId,
    ) -> impl Iterator<Item = &'a ItemRevision> + 'a {
        self.items
            .values()
            .filter(move |item| &item.share_id == share_id)
    }

    pub fn upsert(&mut self, item: ItemRevision) -> Upsert {
        let key = item.key();
        match self.items.get(&key) {
            Some(local) if item.revision <= local.revision => Upsert::Ignored {
                local: local.revision,
            },
            Some(_) => {
                self.items.insert(key, item);
                Upsert::Updated
            }
            None => {
                self.items.insert(key, item);
                Upsert::Inserted
            }
        }
    }

    /// Apply a trash/restore revision bump, keeping the decrypted content.
    pub fn apply_revision_update(&mut self, share_id: &ShareId, update: &RevisionUpdate) -> Upsert {
        let key = ItemKey::new(share_id.clone(), update.item_id.clone());
        let Some(local) = self.items.get_mut(&key) else {
            return Upsert::Missing;
        };
        if update.revision <= local.revision {
            return Upsert::Ignored {
                local: local.revision,
            };
        }
        local.revision = update.revision;
        local.state = update.state;
        local.revision_time = update.revision_time;
        Upsert::Updated
    }

    pub fn remove(&mut self, key: &ItemKey) -> Option<ItemRevision> {
        self.items.remove(key)
    }

    /// Record a use time; never moves it backwards.
    pub fn touch_last_use(&mut self, key: &ItemKey, last_use_time: i64) -> bool {
        match self.items.get_mut(key) {
            Some(item) if item.last_use_time.is_none_or(|current| current < last_use_time) => {
                item.last_use_time = Some(last_use_time);
                true
            }
            _ => false,
        }
    }

    /// Remove every item of a share, returning how many were dropped.
    pub fn drop_share(&mut self, share_id: &ShareId) -> usize {
        let before = self.items.len();
        self.items.retain(|key, _| &key.share_id != share_id);
        before - self.items.len()
    }
}

impl From<Vec<ItemRevision>> for ItemTable {
    fn from(items: Vec<ItemRevision>) -> Self {
        let mut table = Self::new();
        for item in items {
            table.upsert(item);
        }
        table
    }
}

impl From<ItemTable> for Vec<ItemRevision> {
    fn from(table: ItemTable) -> Self {
        table.items.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemContent, ItemState};
    use pretty_assertions::assert_eq;

    fn item(item_id: &str, revision: u64, note: &str) -> ItemRevision {
        ItemRevision {
            share_id: ShareId::new("s"),
            item_id: item_id.into(),
            revision: Revision(revision),
            revision_time: 0,
            last_use_time: None,
            state: ItemState::Active,
            content: ItemContent::note(item_id, note),
        }
    }

    #[test]
    fn upsert_only_accepts_newer_revisions() {
        let mut table = ItemTable::new();
        assert_eq!(table.upsert(item("x", 2, "v2")), Upsert::Inserted);
        assert_eq!(
            table.upsert(item("x", 1, "v1")),
            Upsert::Ignored { local: Revision(2) }
        );
        assert_eq!(
            table.upsert(item("x", 2, "other")),
            Upsert::Ignored { local: Revision(2) }
        );
        assert_eq!(table.upsert(item("x", 3, "v3")), Upsert::Updated);

        let stored = table.get(&ItemKey::new("s", "x")).unwrap();
        assert_eq!(stored.content, ItemContent::note("x", "v3"));
    }

    #[test]
    fn revision_update_keeps_content() {
        let mut table = ItemTable::new();
        table.upsert(item("x", 1, "keep"));
        let update = RevisionUpdate {
            item_id: "x".into(),
            revision: Revision(2),
            state: ItemState::Trashed,
            revision_time: 10,
        };
        assert_eq!(
            table.apply_revision_update(&ShareId::new("s"), &update),
            Upsert::Updated
        );
        assert_eq!(
            table.apply_revision_update(&ShareId::new("s"), &update),
            Upsert::Ignored { local: Revision(2) }
        );
        let stored = table.get(&ItemKey::new("s", "x")).unwrap();
        assert_eq!(stored.state, ItemState::Trashed);
        assert_eq!(stored.content, ItemContent::note("x", "keep"));
    }

    #[test]
    fn last_use_never_moves_backwards() {
        let mut table = ItemTable::new();
        table.upsert(item("x", 1, ""));
        let key = ItemKey::new("s", "x");
        assert!(table.touch_last_use(&key, 100));
        assert!(!table.touch_last_use(&key, 50));
        assert_eq!(table.get(&key).unwrap().last_use_time, Some(100));
    }

    #[test]
    fn serializes_as_list() {
        let mut table = ItemTable::new();
        table.upsert(item("a", 1, ""));
        table.upsert(item("b", 4, ""));
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json.as_array().map(Vec::len), Some(2));
        let restored: ItemTable = serde_json::from_value(json).unwrap();
        assert_eq!(restored, table);
    }
}
