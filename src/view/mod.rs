// Category views: wall/segment groupings recomputed on every query

use crate::reconcile::Status;
use crate::state::{Entity, EntityStore};
use crate::topology::EntityKind;
use std::collections::BTreeMap;

pub use crate::state::GroupType;

/// Group name -> member snapshots, both ordered by name/id
pub type CategoryView = BTreeMap<String, Vec<Entity>>;

/// Simple entity predicate used by the read API
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityFilter {
    pub status: Option<Status>,
    pub kind: Option<EntityKind>,
}

impl EntityFilter {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            kind: None,
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.status.map_or(true, |s| entity.status.value == s)
            && self.kind.map_or(true, |k| entity.kind == k)
    }
}

/// Build the view for one group type.
///
/// Every group from the topology appears, even when the filter leaves it
/// with no members. Each entity is read as one consistent snapshot.
pub fn categorize<F>(store: &EntityStore, group_type: GroupType, filter: F) -> CategoryView
where
    F: Fn(&Entity) -> bool,
{
    store
        .group_index(group_type)
        .iter()
        .map(|(group, ids)| {
            let members = ids
                .iter()
                .filter_map(|id| store.get(id))
                .filter(|entity| filter(entity))
                .collect();
            (group.clone(), members)
        })
        .collect()
}

/// Unfiltered view
pub fn categorize_all(store: &EntityStore, group_type: GroupType) -> CategoryView {
    categorize(store, group_type, |_| true)
}
