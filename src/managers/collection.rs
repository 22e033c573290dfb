//! Item Collection Model.
//!
//! The in-memory working copy of a user's bookmarks or folders. Entries are
//! kept in ascending position order; every replacement of the working set
//! is published on a `watch` channel so views see optimistic state before
//! the remote round-trip resolves.

use tokio::sync::watch;

use crate::types::bookmark::{Bookmark, BookmarkFolder};

/// An entity with a stable id and a position inside some container.
pub trait Positioned: Clone {
    fn id(&self) -> &str;
    fn position(&self) -> i32;
    fn set_position(&mut self, position: i32);

    /// The container the position is scoped to. `None` is the unfiled
    /// container for bookmarks and the single sidebar list for folders.
    fn container(&self) -> Option<&str> {
        None
    }
}

/// A positioned entity that can change containers.
pub trait Relocatable: Positioned {
    fn set_container(&mut self, container: Option<String>);
}

impl Positioned for Bookmark {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }

    fn container(&self) -> Option<&str> {
        self.folder_id.as_deref()
    }
}

impl Relocatable for Bookmark {
    fn set_container(&mut self, container: Option<String>) {
        self.folder_id = container;
    }
}

impl Positioned for BookmarkFolder {
    fn id(&self) -> &str {
        &self.id
    }

    fn position(&self) -> i32 {
        self.position
    }

    fn set_position(&mut self, position: i32) {
        self.position = position;
    }
}

/// Single-owner working set of positioned entities.
pub struct ItemCollection<T: Positioned> {
    items: Vec<T>,
    published: watch::Sender<Vec<T>>,
}

impl<T: Positioned> ItemCollection<T> {
    pub fn new() -> Self {
        let (published, _) = watch::channel(Vec::new());
        Self {
            items: Vec::new(),
            published,
        }
    }

    /// Replaces the entire working set.
    pub fn load(&mut self, mut items: Vec<T>) {
        items.sort_by_key(|item| item.position());
        self.items = items;
        self.publish();
    }

    /// An independent copy that `load` can restore later.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    /// Receives every state the collection passes through.
    pub fn subscribe(&self) -> watch::Receiver<Vec<T>> {
        self.published.subscribe()
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Entries of one container in ascending position order.
    pub fn in_container(&self, container: Option<&str>) -> Vec<&T> {
        let mut entries: Vec<&T> = self
            .items
            .iter()
            .filter(|item| item.container() == container)
            .collect();
        entries.sort_by_key(|item| item.position());
        entries
    }

    pub(crate) fn push(&mut self, item: T) {
        let mut next = self.snapshot();
        next.push(item);
        self.load(next);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.items.iter().position(|item| item.id() == id)?;
        let removed = self.items.remove(index);
        self.publish();
        Some(removed)
    }

    /// Swaps the entry with id `old_id` for `row`, e.g. a temporary row for
    /// the stored one. Appends `row` when `old_id` is gone.
    pub(crate) fn replace(&mut self, old_id: &str, row: T) {
        let mut next = self.snapshot();
        match next.iter().position(|item| item.id() == old_id) {
            Some(index) => next[index] = row,
            None => next.push(row),
        }
        self.load(next);
    }

    /// Overwrites entries by id with canonical rows from the store.
    pub(crate) fn reconcile(&mut self, rows: Vec<T>) {
        if rows.is_empty() {
            return;
        }
        let mut next = self.snapshot();
        for row in rows {
            match next.iter().position(|item| item.id() == row.id()) {
                Some(index) => next[index] = row,
                None => next.push(row),
            }
        }
        self.load(next);
    }

    fn publish(&self) {
        self.published.send_replace(self.items.clone());
    }
}

impl<T: Positioned> Default for ItemCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}
