use std::collections::BTreeMap;

use crate::snapshot::{ListedItem, PostId};

/// Items the harvester currently considers present, with the modification
/// timestamp last seen for each.
///
/// Built fresh from every listing and replaced wholesale; never edited in
/// place once a cycle has produced it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AliveSet {
    entries: BTreeMap<PostId, String>,
}

impl AliveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl<K: Into<PostId>, V: Into<String>> FromIterator<(K, V)> for AliveSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(id, ts)| (id.into(), ts.into()))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemChange {
    New,
    Updated,
    Unchanged,
}

/// Outcome of comparing one listing against the previous alive-set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeDecision {
    /// Ids to fetch, unique, in listing order.
    pub to_fetch: Vec<PostId>,
    pub next_alive: AliveSet,
    pub new: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Ids alive before that the listing no longer mentions.
    pub vanished: usize,
}

pub fn classify(previous: &AliveSet, item: &ListedItem) -> ItemChange {
    match previous.get(&item.id) {
        None => ItemChange::New,
        Some(seen) if seen != item.updated_at => ItemChange::Updated,
        Some(_) => ItemChange::Unchanged,
    }
}

/// Decides which listed items need a fresh fetch and builds the next
/// alive-set from exactly the ids in `items`.
///
/// Ids missing from the listing simply fall out of the next alive-set; if one
/// comes back later it is fetched again as new. A repeated id within one
/// listing is only considered at its first occurrence.
pub fn decide(previous: &AliveSet, items: &[ListedItem]) -> ChangeDecision {
    let mut decision = ChangeDecision::default();
    for item in items {
        if decision.next_alive.contains(&item.id) {
            continue;
        }
        match classify(previous, item) {
            ItemChange::New => {
                decision.new += 1;
                decision.to_fetch.push(item.id.clone());
            }
            ItemChange::Updated => {
                decision.updated += 1;
                decision.to_fetch.push(item.id.clone());
            }
            ItemChange::Unchanged => decision.unchanged += 1,
        }
        decision
            .next_alive
            .entries
            .insert(item.id.clone(), item.updated_at.clone());
    }
    decision.vanished = previous
        .ids()
        .filter(|id| !decision.next_alive.contains(id))
        .count();
    decision
}
