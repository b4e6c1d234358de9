//! Queries: live views over entities holding a fixed set of component kinds.
//!
//! Match sets are maintained incrementally by the world on every insert and
//! remove. Each membership change is appended to a log stamped with the change
//! tick at which it happened; a system's `added`/`removed` sets are derived
//! from the log entries inside its observation window.

use std::collections::{HashMap, HashSet};

use super::{
    entity::EntityId,
    storage::{Component, ComponentKind},
};

/// Component-kind predicate of a query. Order and duplicates are irrelevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct QuerySpec {
    kinds: Vec<ComponentKind>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires component `T`.
    pub fn with<T: Component>(mut self) -> Self {
        let kind = ComponentKind::of::<T>();
        if let Err(pos) = self.kinds.binary_search(&kind) {
            self.kinds.insert(pos, kind);
        }
        self
    }

    pub fn kinds(&self) -> &[ComponentKind] {
        &self.kinds
    }
}

/// Handle returned by `World::register_query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub(crate) usize);

/// Snapshot of a query for the current observer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryView {
    /// Current matches in the order they entered the match set.
    pub results: Vec<EntityId>,
    /// Entities that started matching since the observer last ran.
    pub added: Vec<EntityId>,
    /// Entities that stopped matching since the observer last ran.
    pub removed: Vec<EntityId>,
}

/// Half-open range `[since, until)` of change ticks an observer has not seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Window {
    pub since: u64,
    pub until: u64,
}

impl Window {
    /// Everything still retained in the logs.
    pub const ALL: Self = Self {
        since: 0,
        until: u64::MAX,
    };

    fn contains(&self, tick: u64) -> bool {
        tick >= self.since && tick < self.until
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Added,
    Removed,
}

#[derive(Debug)]
pub(crate) struct QueryState {
    spec: QuerySpec,
    /// Insertion-ordered members. Holes left by evictions are compacted lazily.
    slots: Vec<Option<EntityId>>,
    position: HashMap<EntityId, usize>,
    log: Vec<(u64, EntityId, Change)>,
}

impl QueryState {
    pub fn new(spec: QuerySpec) -> Self {
        Self {
            spec,
            slots: Vec::new(),
            position: HashMap::new(),
            log: Vec::new(),
        }
    }

    /// True if an entity with `signature` satisfies the predicate.
    pub fn accepts(&self, signature: &HashSet<ComponentKind>) -> bool {
        self.spec.kinds.iter().all(|k| signature.contains(k))
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.position.contains_key(&entity)
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn admit(&mut self, entity: EntityId, tick: u64) {
        if self.position.contains_key(&entity) {
            return;
        }
        self.position.insert(entity, self.slots.len());
        self.slots.push(Some(entity));
        self.log.push((tick, entity, Change::Added));
    }

    pub fn evict(&mut self, entity: EntityId, tick: u64) {
        let Some(pos) = self.position.remove(&entity) else {
            return;
        };
        self.slots[pos] = None;
        self.log.push((tick, entity, Change::Removed));

        if self.slots.len() > 32 && self.position.len() * 2 < self.slots.len() {
            self.compact();
        }
    }

    fn compact(&mut self) {
        self.slots.retain(Option::is_some);
        for (pos, slot) in self.slots.iter().enumerate() {
            if let Some(entity) = slot {
                self.position.insert(*entity, pos);
            }
        }
    }

    pub fn results(&self) -> Vec<EntityId> {
        self.slots.iter().flatten().copied().collect()
    }

    /// Net membership change per entity inside `window`.
    ///
    /// An entity that left and re-entered (or entered and left) within the
    /// window reports nothing.
    pub fn diff(&self, window: Window) -> (Vec<EntityId>, Vec<EntityId>) {
        let mut order = Vec::new();
        let mut first_last: HashMap<EntityId, (Change, Change)> = HashMap::new();

        for &(tick, entity, change) in &self.log {
            if !window.contains(tick) {
                continue;
            }
            first_last
                .entry(entity)
                .and_modify(|(_, last)| *last = change)
                .or_insert_with(|| {
                    order.push(entity);
                    (change, change)
                });
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        for entity in order {
            let (first, last) = first_last[&entity];
            // The first event tells the state before the window, the last one after it.
            let was_member = first == Change::Removed;
            let is_member = last == Change::Added;
            match (was_member, is_member) {
                (false, true) => added.push(entity),
                (true, false) => removed.push(entity),
                _ => {}
            }
        }
        (added, removed)
    }

    /// Drops log entries stamped before `tick`.
    pub fn purge(&mut self, tick: u64) {
        self.log.retain(|(stamp, _, _)| *stamp >= tick);
    }
}
