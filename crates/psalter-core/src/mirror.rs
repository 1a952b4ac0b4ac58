//! Mirror State - the cached copy of a remote collection.
//!
//! A mirror holds the entities last seen from the server together with the
//! status flags observers render (`loading`, `error`, `success`) and the
//! `initialized` marker that gates once-only loading.
//!
//! Invariants maintained by every operation here:
//! - `items` never holds two entities with the same id.
//! - Entities written into `items` are the ones handed in, never merged
//!   field-by-field, so a server response fully replaces the cached version.

use crate::entity::Entity;
use crate::event::{Action, RealtimeEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Where a newly created entity lands in `items`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Placement {
    /// Newest-first lists.
    Prepend,
    #[default]
    Append,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MirrorState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
    pub success: Option<String>,
    pub initialized: bool,
}

impl<T> Default for MirrorState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: false,
            error: None,
            success: None,
            initialized: false,
        }
    }
}

impl<T: Entity> MirrorState<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|item| item.id() == id)
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Replace the cache wholesale with a fresh server listing.
    ///
    /// A listing containing the same id twice keeps the first position and
    /// the last version.
    pub fn replace_all(&mut self, items: Vec<T>) {
        let mut deduped: Vec<T> = Vec::with_capacity(items.len());
        let mut index: HashMap<String, usize> = HashMap::with_capacity(items.len());

        for item in items {
            match index.get(item.id()) {
                Some(&at) => deduped[at] = item,
                None => {
                    index.insert(item.id().to_string(), deduped.len());
                    deduped.push(item);
                }
            }
        }

        self.items = deduped;
    }

    /// Insert a server-returned entity, replacing it in place if already cached.
    pub fn insert(&mut self, entity: T, placement: Placement) {
        if let Some(at) = self.position(entity.id()) {
            self.items[at] = entity;
            return;
        }
        match placement {
            Placement::Prepend => self.items.insert(0, entity),
            Placement::Append => self.items.push(entity),
        }
    }

    /// Replace the cached entity with the same id. Absent ids are not inserted.
    pub fn replace(&mut self, entity: T) -> bool {
        match self.position(entity.id()) {
            Some(at) => {
                self.items[at] = entity;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<T> {
        self.position(id).map(|at| self.items.remove(at))
    }

    /// Keep only the entities matching `keep`, returning how many were dropped.
    pub fn retain<F: FnMut(&T) -> bool>(&mut self, keep: F) -> usize {
        let before = self.items.len();
        self.items.retain(keep);
        before - self.items.len()
    }

    /// Fold a real-time event into the cache.
    ///
    /// - `create` appends, or replaces the cached version if already present
    /// - `update` replaces by id and ignores ids that are not cached
    /// - `delete` removes by id
    ///
    /// Returns whether `items` changed. Folding the same event twice reports
    /// a change at most once.
    pub fn fold(&mut self, event: RealtimeEvent<T>) -> bool
    where
        T: PartialEq,
    {
        let RealtimeEvent { action, record } = event;
        match action {
            Action::Create => match self.position(record.id()) {
                Some(at) if self.items[at] == record => false,
                Some(at) => {
                    self.items[at] = record;
                    true
                }
                None => {
                    self.items.push(record);
                    true
                }
            },
            Action::Update => match self.position(record.id()) {
                Some(at) if self.items[at] == record => false,
                Some(at) => {
                    self.items[at] = record;
                    true
                }
                None => false,
            },
            Action::Delete => self.remove(record.id()).is_some(),
        }
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn clear_success(&mut self) {
        self.success = None;
    }
}
