//! Derived view: confirmed items with optimistic entries applied on top.

use std::collections::BTreeMap;

use super::{Mutation, MutationState, OptimisticEntry, OptimisticId};
use crate::models::{ItemId, ItemKey, ItemRevision, ItemState, ShareId};
use crate::sync::ItemTable;

/// One item as the user should see it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewItem {
    pub item: ItemRevision,
    /// Set while a pending mutation shapes this item
    pub optimistic: Option<OptimisticId>,
    /// A mutation on this item was rejected and not yet dismissed
    pub failed: bool,
}

impl ViewItem {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.optimistic.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DerivedView {
    items: BTreeMap<ItemKey, ViewItem>,
}

impl DerivedView {
    pub fn get(&self, key: &ItemKey) -> Option<&ViewItem> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &ItemKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ViewItem> {
        self.items.values()
    }

    pub fn items_in_share<'a>(
        &'a self,
        share_id: &'a ShareId,
    ) -> impl Iterator<Item = &'a ViewItem> + 'a {
        self.items
            .values()
            .filter(move |view| &view.item.share_id == share_id)
    }

    /// Items of a share that are not in the trash
    pub fn active_in_share<'a>(
        &'a self,
        share_id: &'a ShareId,
    ) -> impl Iterator<Item = &'a ViewItem> + 'a {
        self.items_in_share(share_id)
            .filter(|view| view.item.state == ItemState::Active)
    }

    pub fn trashed(&self) -> impl Iterator<Item = &ViewItem> {
        self.items
            .values()
            .filter(|view| view.item.state == ItemState::Trashed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ViewItem> {
        self.items.values().filter(|view| view.failed)
    }
}

pub(super) fn project(entries: &[OptimisticEntry], table: &ItemTable) -> DerivedView {
    let mut items: BTreeMap<ItemKey, ViewItem> = table
        .iter()
        .map(|item| {
            (
                item.key(),
                ViewItem {
                    item: item.clone(),
                    optimistic: None,
                    failed: false,
                },
            )
        })
        .collect();

    for entry in entries {
        let marker = match &entry.state {
            MutationState::Pending => Some(entry.id.clone()),
            MutationState::Confirmed(_) => None,
            MutationState::Failed(_) => {
                for key in entry.mutation.targets() {
                    if let Some(view) = items.get_mut(&key) {
                        view.failed = true;
                    }
                }
                continue;
            }
        };

        match &entry.mutation {
            Mutation::Move { item, destination } => {
                let moved = ItemId::new(entry.id.to_string());
                move_item(&mut items, item, destination, moved, marker.as_ref());
            }
            Mutation::MoveMany {
                selection,
                destination,
            } => {
                for key in selection.keys() {
                    let moved = ItemId::new(format!("{}:{}", entry.id, key.item_id));
                    move_item(&mut items, &key, destination, moved, marker.as_ref());
                }
            }
            Mutation::Trash { item } => {
                set_state(&mut items, item, ItemState::Trashed, marker.as_ref());
            }
            Mutation::TrashMany { selection } => {
                for key in selection.keys() {
                    set_state(&mut items, &key, ItemState::Trashed, marker.as_ref());
                }
            }
            Mutation::Restore { item } => {
                set_state(&mut items, item, ItemState::Active, marker.as_ref());
            }
            Mutation::RestoreMany { selection } => {
                for key in selection.keys() {
                    set_state(&mut items, &key, ItemState::Active, marker.as_ref());
                }
            }
            Mutation::Delete { item } => {
                items.remove(item);
            }
            Mutation::DeleteMany { selection } => {
                for key in selection.keys() {
                    items.remove(&key);
                }
            }
        }
    }

    DerivedView { items }
}

fn move_item(
    items: &mut BTreeMap<ItemKey, ViewItem>,
    from: &ItemKey,
    destination: &ShareId,
    moved_id: ItemId,
    marker: Option<&OptimisticId>,
) {
    let Some(mut view) = items.remove(from) else {
        return;
    };
    view.item.share_id = destination.clone();
    view.item.item_id = moved_id;
    view.optimistic = marker.cloned();
    items.insert(view.item.key(), view);
}

fn set_state(
    items: &mut BTreeMap<ItemKey, ViewItem>,
    key: &ItemKey,
    state: ItemState,
    marker: Option<&OptimisticId>,
) {
    if let Some(view) = items.get_mut(key) {
        view.item.state = state;
        if marker.is_some() {
            view.optimistic = marker.cloned();
        }
    }
}
